//! Message framing for associations
//!
//! Each message travels as one length-delimited frame holding its JSON
//! encoding. The association layer is written against `tokio_util` codecs,
//! so a full PDU codec can take this one's place without touching the
//! correlation engine.

use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::types::{DimseRequest, DimseResponse};
use crate::DimseError;

/// Largest frame accepted from a peer
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Codec used by the requesting side: writes requests, reads responses
pub type ScuCodec = JsonFrameCodec<DimseResponse, DimseRequest>;

/// Codec used by the answering side: reads requests, writes responses
pub type ScpCodec = JsonFrameCodec<DimseRequest, DimseResponse>;

/// Length-delimited JSON codec decoding `D` and encoding `E`
pub struct JsonFrameCodec<D, E> {
    frames: LengthDelimitedCodec,
    _marker: PhantomData<fn() -> (D, E)>,
}

impl<D, E> JsonFrameCodec<D, E> {
    pub fn new() -> Self {
        Self {
            frames: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_FRAME_LENGTH)
                .new_codec(),
            _marker: PhantomData,
        }
    }
}

impl<D, E> Default for JsonFrameCodec<D, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: DeserializeOwned, E> Decoder for JsonFrameCodec<D, E> {
    type Item = D;
    type Error = DimseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<D>, DimseError> {
        match self.frames.decode(src)? {
            Some(frame) => serde_json::from_slice(&frame)
                .map(Some)
                .map_err(|e| DimseError::Codec(format!("malformed message: {}", e))),
            None => Ok(None),
        }
    }
}

impl<D, E: Serialize> Encoder<E> for JsonFrameCodec<D, E> {
    type Error = DimseError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<(), DimseError> {
        let payload = serde_json::to_vec(&item)?;
        self.frames.encode(Bytes::from(payload), dst)?;
        Ok(())
    }
}
