use std::io::Write;

use crate::{
    CliErr, Result,
    network::Network,
    stream::{VecReader, vec_str},
};

/// Writes every parameter group of the network as one vector line.
pub fn read_params<W: Write>(network: &Network, out: &mut W) -> Result<()> {
    for group in network.groups() {
        writeln!(out, "{}", vec_str(group))?;
    }

    Ok(())
}

/// Replaces every parameter group of the network with the next vector of `reader`.
///
/// # Returns
/// `BadLength` if a vector's length differs from its group's size, in which case the network
/// is left partially updated.
pub fn write_params(network: &mut Network, reader: &mut VecReader) -> Result<()> {
    for group in network.groups_mut() {
        let vec = reader.read()?;
        if vec.len() != group.len() {
            return Err(CliErr::BadLength {
                op: "write parameters",
                len: vec.len(),
                chunk: group.len(),
            });
        }

        group.copy_from_slice(&vec);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::{Sequential, layers::Layer};

    use super::*;
    use crate::network::ModelVariant;

    fn network() -> Network {
        let net = Sequential::new([Layer::dense((2, 2), None), Layer::dense((2, 1), None)]).unwrap();
        Network::new(ModelVariant::FeedForward(net), Some(3)).unwrap()
    }

    #[test]
    fn written_parameters_read_back() {
        let mut net = network();
        let mut reader = VecReader::from_text("1 2 3 4 5 6\n7 8 9\n");
        write_params(&mut net, &mut reader).unwrap();

        let mut out = Vec::new();
        read_params(&net, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1 2 3 4 5 6\n7 8 9\n");
    }

    #[test]
    fn wrong_group_length_is_rejected() {
        let mut net = network();
        let mut reader = VecReader::from_text("1 2 3 4 5 6\n7 8\n");

        let res = write_params(&mut net, &mut reader);
        assert!(matches!(res, Err(CliErr::BadLength { len: 2, chunk: 3, .. })));
    }

    #[test]
    fn missing_groups_are_reported() {
        let mut net = network();
        let mut reader = VecReader::from_text("1 2 3 4 5 6\n");
        assert!(matches!(write_params(&mut net, &mut reader), Err(CliErr::EndOfInput)));
    }
}
