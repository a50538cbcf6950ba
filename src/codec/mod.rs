//! Wire codec: hand-rolled BER primitives (`ber`), the LDAPv3 message
//! grammar built on top of them (`message`), and a `tokio_util::codec`
//! `Decoder`/`Encoder` pair tying the two to a `Framed` transport.

pub mod ber;
pub mod message;

pub use message::{LdapMsg, LdapOp, LdapResult, ModOperation, Modification, PartialAttribute, ResultCode, Scope};

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::errors::{HeraclesError, Result};

/// A `tokio_util::codec::Framed`-compatible codec over `LdapMsg`. Decoding
/// waits for a complete PDU (tag + length + content) to accumulate in the
/// buffer before attempting to parse it, so a message split across TCP
/// segments is handled transparently.
#[derive(Debug, Default)]
pub struct LdapCodec;

impl Decoder for LdapCodec {
    type Item = LdapMsg;
    type Error = HeraclesError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<LdapMsg>> {
        let total_len = match ber::peek_total_len(src)? {
            Some(len) => len,
            None => return Ok(None),
        };
        if src.len() < total_len {
            return Ok(None);
        }
        let frame = src.split_to(total_len);
        let msg = LdapMsg::decode(&frame)?;
        Ok(Some(msg))
    }
}

impl Encoder<LdapMsg> for LdapCodec {
    type Error = HeraclesError;

    fn encode(&mut self, item: LdapMsg, dst: &mut BytesMut) -> Result<()> {
        let bytes = item.encode();
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}
