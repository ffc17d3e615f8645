mod loss_fn;
mod mse;
mod sigmoid_ce;
mod softmax_ce;

pub use loss_fn::LossFn;
pub use mse::Mse;
pub use sigmoid_ce::SigmoidCe;
pub use softmax_ce::SoftmaxCe;
