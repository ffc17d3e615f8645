mod block;
mod cell;
mod lstm;
mod vanilla;

pub use block::{Block, BlockTrace, State};
pub use cell::{Cell, CellState, CellTrace};
pub use lstm::{Lstm, LstmTrace};
pub use vanilla::{Vanilla, VanillaTrace};
