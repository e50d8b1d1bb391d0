// ai
//! 🧩 Record decoder: bytes in, JSON objects out, chunk boundaries be damned.
//!
//! The store slices its output wherever it feels like. A record can start in
//! one chunk and finish three chunks later. This decoder reads whatever the
//! pipe gives it, waits until a record delimiter shows up (memchr, because
//! scanning for `\n` one byte at a time is a hobby, not a strategy), then lets
//! serde_json's streaming deserializer peel off every complete object. The
//! unfinished tail stays in the buffer for the next read.
//!
//! Records may be separated by any JSON whitespace, not just newlines. A
//! record split across a newline still decodes, it just waits a little longer.
//!
//! At EOF whatever is left must be whitespace. Anything else is a truncated
//! record and an error, because "we got most of it" is not a result.

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::common::Record;

const READ_CHUNK: usize = 8 * 1024;

/// 🧩 Streaming decoder over any async byte source.
pub struct RecordDecoder<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R> RecordDecoder<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// 🔄 Read to EOF, decoding as we go. Records come back in emission order.
    pub async fn decode_all(mut self) -> Result<Vec<Record>> {
        let mut the_records = Vec::new();
        loop {
            let the_previous_len = self.buf.len();
            self.buf.reserve(READ_CHUNK);
            let the_bytes_read = self
                .reader
                .read_buf(&mut self.buf)
                .await
                .context("💀 reading from the record pipe failed")?;
            if the_bytes_read == 0 {
                break;
            }
            // -- 🔍 no delimiter in the new bytes means no new complete record, usually
            if memchr::memchr(b'\n', &self.buf[the_previous_len..]).is_some() {
                drain_complete_records(&mut self.buf, &mut the_records)?;
            }
        }

        drain_complete_records(&mut self.buf, &mut the_records)?;
        if self.buf.iter().any(|b| !b.is_ascii_whitespace()) {
            bail!(
                "💀 stream ended mid-record: {} undecoded bytes left over",
                self.buf.len()
            );
        }
        Ok(the_records)
    }
}

/// 🍽️ Decode every complete value at the front of `buf`, then drop those bytes.
/// A trailing partial value stays put.
fn drain_complete_records(buf: &mut Vec<u8>, out: &mut Vec<Record>) -> Result<()> {
    let the_consumed = {
        let mut the_stream = serde_json::Deserializer::from_slice(buf.as_slice()).into_iter::<Record>();
        let mut the_consumed = 0;
        loop {
            match the_stream.next() {
                Some(Ok(record)) => {
                    out.push(record);
                    the_consumed = the_stream.byte_offset();
                }
                Some(Err(err)) if err.is_eof() => break,
                Some(Err(err)) => {
                    return Err(err).context(format!(
                        "💀 record {} in the select output is not a JSON object",
                        out.len() + 1
                    ));
                }
                None => {
                    the_consumed = the_stream.byte_offset();
                    break;
                }
            }
        }
        the_consumed
    };
    buf.drain(..the_consumed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn decode_in_chunks(payload: &[u8], chunk_size: usize) -> Result<Vec<Record>> {
        let (mut the_writer, the_reader) = tokio::io::duplex(16);
        let the_payload = payload.to_vec();
        let the_producer = tokio::spawn(async move {
            for chunk in the_payload.chunks(chunk_size) {
                the_writer.write_all(chunk).await?;
            }
            the_writer.shutdown().await
        });
        let the_records = RecordDecoder::new(the_reader).decode_all().await;
        the_producer
            .await
            .expect("💀 producer panicked")
            .expect("💀 producer write failed");
        the_records
    }

    #[tokio::test]
    async fn the_one_where_k_records_in_means_k_records_out_in_order() {
        let the_payload: String = (0..50).map(|i| format!("{{\"n\":{i}}}\n")).collect();
        for the_chunk_size in [1, 3, 7, 64, 4096] {
            let the_records = decode_in_chunks(the_payload.as_bytes(), the_chunk_size)
                .await
                .expect("💀 should decode");
            assert_eq!(the_records.len(), 50, "chunk size {the_chunk_size}");
            for (i, record) in the_records.iter().enumerate() {
                assert_eq!(record["n"], i as u64, "chunk size {the_chunk_size}");
            }
        }
    }

    #[tokio::test]
    async fn the_one_where_silence_decodes_to_nothing() {
        let the_records = decode_in_chunks(b"", 4).await.expect("💀 empty is fine");
        assert!(the_records.is_empty());
        let the_records = decode_in_chunks(b"\n  \n", 4).await.expect("💀 whitespace is fine");
        assert!(the_records.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_whitespace_other_than_newline_still_separates_records() {
        let the_records = decode_in_chunks(b"{\"a\":1} {\"a\":2}\t{\"a\":3}", 2)
            .await
            .expect("💀 should decode");
        assert_eq!(the_records.len(), 3);
    }

    #[tokio::test]
    async fn the_one_where_a_record_with_a_newline_inside_still_decodes() {
        let the_records = decode_in_chunks(b"{\"a\":\n1}\n{\"b\":2}\n", 3)
            .await
            .expect("💀 pretty JSON should still decode");
        assert_eq!(the_records.len(), 2);
        assert_eq!(the_records[0]["a"], 1);
    }

    #[tokio::test]
    async fn the_one_where_a_truncated_tail_is_an_error() {
        let the_result = decode_in_chunks(b"{\"a\":1}\n{\"a\":", 4).await;
        assert!(the_result.is_err(), "half a record is not a record");
    }

    #[tokio::test]
    async fn the_one_where_a_non_object_is_an_error() {
        let the_result = decode_in_chunks(b"{\"a\":1}\n42\n", 4).await;
        assert!(the_result.is_err());
    }
}
