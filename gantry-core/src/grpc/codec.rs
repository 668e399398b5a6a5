//! # Dynamic Wire Codec
//!
//! An implementation of `tonic::codec::Codec` that carries [`DynamicMessage`] values,
//! bypassing the need for generated Rust structs.
//!
//! The encoder serializes an already-validated `DynamicMessage` into the gRPC byte
//! buffer; the decoder reads raw bytes from the wire and interprets them with the
//! response descriptor. Validation of loosely-typed input happens earlier, in
//! [`crate::json`], so the codec itself only deals with schema-typed values.
use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor, ReflectMessage};
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

/// A `tonic` codec for messages whose schema is resolved at runtime.
///
/// It holds the descriptors for both the request and the response messages, allowing it
/// to perform dynamic serialization in either direction.
pub struct DynamicCodec {
    /// Schema for the input message.
    request: MessageDescriptor,
    /// Schema for the output message.
    response: MessageDescriptor,
}

impl DynamicCodec {
    pub fn new(request: MessageDescriptor, response: MessageDescriptor) -> Self {
        Self { request, response }
    }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;

    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder(self.request.clone())
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder(self.response.clone())
    }
}

/// Serializes a [`DynamicMessage`] into Protobuf bytes.
pub struct DynamicEncoder(MessageDescriptor);

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        debug_assert_eq!(item.descriptor(), self.0);
        item.encode_raw(dst);
        Ok(())
    }
}

/// Deserializes Protobuf bytes into a [`DynamicMessage`].
pub struct DynamicDecoder(MessageDescriptor);

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let mut message = DynamicMessage::new(self.0.clone());
        message
            .merge(src)
            .map_err(|e| Status::internal(format!("Failed to decode Protobuf bytes: {}", e)))?;
        Ok(Some(message))
    }
}
