//! Datagram <-> message conversion on top of `rosc`.

use rosc::{OscMessage, OscPacket};

use crate::error::{GatewayError, Result};
use crate::value::OscValue;

/// A decoded OSC message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub address: String,
    pub args: Vec<OscValue>,
}

impl Message {
    pub fn new(address: impl Into<String>, args: Vec<OscValue>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }
}

/// Encode one message as a datagram.
pub fn encode(address: &str, args: &[OscValue]) -> Result<Vec<u8>> {
    let packet = OscPacket::Message(OscMessage {
        addr: address.to_string(),
        args: args.iter().cloned().map(Into::into).collect(),
    });
    rosc::encoder::encode(&packet).map_err(|e| GatewayError::Encode {
        address: address.to_string(),
        message: format!("{:?}", e),
    })
}

/// Decode a datagram, flattening bundles into their messages in order.
pub fn decode(datagram: &[u8]) -> std::result::Result<Vec<Message>, String> {
    let (_rest, packet) = rosc::decoder::decode_udp(datagram).map_err(|e| format!("{:?}", e))?;
    let mut out = Vec::new();
    flatten(packet, &mut out);
    Ok(out)
}

fn flatten(packet: OscPacket, out: &mut Vec<Message>) {
    match packet {
        OscPacket::Message(msg) => out.push(Message {
            address: msg.addr,
            args: msg.args.into_iter().map(OscValue::from).collect(),
        }),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out);
            }
        }
    }
}
