//! Bounded-chunk sealing of large plaintext buffers.
//!
//! A buffer of `n` bytes becomes `ceil(n / chunk_size)` tokens, each sealing
//! one contiguous chunk, handed to the sink in order. A failure part way
//! through leaves the sink holding a prefix of complete tokens; nothing here
//! makes a multi-chunk write atomic.

use veilfs_core::{VeilError, VeilResult};

use crate::codec::{Token, TokenCodec};

pub struct ChunkedWriter<'a> {
    codec: &'a TokenCodec,
    chunk_size: usize,
}

impl<'a> ChunkedWriter<'a> {
    pub fn new(codec: &'a TokenCodec, chunk_size: usize) -> VeilResult<Self> {
        if chunk_size == 0 {
            return Err(VeilError::Config("chunk size must be greater than zero".into()));
        }
        Ok(Self { codec, chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of tokens a buffer of `len` bytes is sealed into.
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.chunk_size)
    }

    /// Lazily seal `data` chunk by chunk.
    pub fn tokens<'d>(&'d self, data: &'d [u8]) -> impl Iterator<Item = VeilResult<Token>> + 'd {
        data.chunks(self.chunk_size)
            .map(move |chunk| self.codec.encrypt(chunk))
    }

    /// Seal `data` and pass each token to `sink` in order, one call per
    /// chunk. Returns the number of plaintext bytes written. Empty input
    /// never calls the sink.
    pub fn write<F>(&self, data: &[u8], mut sink: F) -> VeilResult<usize>
    where
        F: FnMut(&Token) -> VeilResult<()>,
    {
        for token in self.tokens(data) {
            sink(&token?)?;
        }
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::decrypt_stream;
    use crate::keys::OverlayKey;
    use proptest::prelude::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(OverlayKey::from_bytes([9u8; 32]))
    }

    fn collect(writer: &ChunkedWriter<'_>, data: &[u8]) -> (usize, Vec<Token>) {
        let mut tokens = Vec::new();
        let written = writer
            .write(data, |t| {
                tokens.push(t.clone());
                Ok(())
            })
            .unwrap();
        (written, tokens)
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let codec = codec();
        assert!(matches!(ChunkedWriter::new(&codec, 0), Err(VeilError::Config(_))));
    }

    #[test]
    fn test_empty_input_never_calls_sink() {
        let codec = codec();
        let writer = ChunkedWriter::new(&codec, 16).unwrap();
        let written = writer
            .write(b"", |_| panic!("sink must not be called for empty input"))
            .unwrap();
        assert_eq!(written, 0);
    }

    #[test]
    fn test_chunk_count_is_ceiling() {
        let codec = codec();
        let writer = ChunkedWriter::new(&codec, 4).unwrap();
        assert_eq!(writer.chunk_count(0), 0);
        assert_eq!(writer.chunk_count(1), 1);
        assert_eq!(writer.chunk_count(4), 1);
        assert_eq!(writer.chunk_count(5), 2);
        assert_eq!(writer.chunk_count(9), 3);
    }

    #[test]
    fn test_one_token_per_chunk_in_order() {
        let codec = codec();
        let writer = ChunkedWriter::new(&codec, 5).unwrap();
        let data = b"abcdefghijkl";

        let (written, tokens) = collect(&writer, data);
        assert_eq!(written, data.len());
        assert_eq!(tokens.len(), 3);

        let plain: Vec<Vec<u8>> = tokens
            .iter()
            .map(|t| codec.decrypt(t.as_bytes()).unwrap())
            .collect();
        assert_eq!(plain, vec![b"abcde".to_vec(), b"fghij".to_vec(), b"kl".to_vec()]);
    }

    #[test]
    fn test_sink_error_stops_after_prefix() {
        let codec = codec();
        let writer = ChunkedWriter::new(&codec, 2).unwrap();
        let mut calls = 0;
        let result = writer.write(b"aabbcc", |_| {
            calls += 1;
            if calls == 2 {
                Err(VeilError::Storage("disk full".into()))
            } else {
                Ok(())
            }
        });
        assert!(matches!(result, Err(VeilError::Storage(_))));
        assert_eq!(calls, 2, "no further chunks after a failed append");
    }

    proptest! {
        #[test]
        fn chunk_boundaries_are_transparent(chunk_size in 1usize..300, extra in 0usize..3) {
            let codec = codec();
            let writer = ChunkedWriter::new(&codec, chunk_size).unwrap();
            let data: Vec<u8> = (0..2 * chunk_size + extra).map(|i| (i * 31 % 251) as u8).collect();

            let (_, tokens) = collect(&writer, &data);
            prop_assert_eq!(tokens.len(), writer.chunk_count(data.len()));

            let stream: Vec<u8> = tokens.iter().flat_map(|t| t.as_bytes().to_vec()).collect();
            prop_assert_eq!(decrypt_stream(&codec, &stream).unwrap(), data);
        }
    }
}
