use serde::{Deserialize, Serialize};

use crate::error::CrosslockError;
use crate::order::{
    AcceptanceNotice, OrderAnnouncement, OrderDetails, ProposalTerms, RejectionNotice, SealedBlob,
};
use crate::types::{serde_hex_vec, OrderId, ProposalId, Timestamp};

// ── Envelopes ────────────────────────────────────────────────────────────────

/// Authenticated wire envelope. The signature covers exactly
/// `kind_utf8 || payload`; the signer's uncompressed P-256 public key rides
/// in-band so receivers verify without prior key exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(with = "serde_hex_vec")]
    pub payload: Vec<u8>,
    #[serde(with = "serde_hex_vec")]
    pub signature: Vec<u8>,
    #[serde(with = "serde_hex_vec")]
    pub signer_public_key: Vec<u8>,
    pub timestamp: Timestamp,
}

impl SignedEnvelope {
    /// The canonical bytes a signature is computed over.
    pub fn signing_bytes(kind: &str, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(kind.len() + payload.len());
        buf.extend_from_slice(kind.as_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    /// The bytes this envelope's signature must verify against.
    pub fn message_bytes(&self) -> Vec<u8> {
        Self::signing_bytes(&self.kind, &self.payload)
    }
}

/// Unauthenticated envelope, used only for benign traffic and as a
/// backward-compatible fallback. Unknown fields are rejected so a signed
/// envelope never silently decodes as plain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlainEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(with = "serde_hex_vec")]
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Signed(SignedEnvelope),
    Plain(PlainEnvelope),
}

impl Envelope {
    pub fn kind(&self) -> &str {
        match self {
            Envelope::Signed(e) => &e.kind,
            Envelope::Plain(e) => &e.kind,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            Envelope::Signed(e) => &e.payload,
            Envelope::Plain(e) => &e.payload,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CrosslockError> {
        let bytes = match self {
            Envelope::Signed(e) => serde_json::to_vec(e)?,
            Envelope::Plain(e) => serde_json::to_vec(e)?,
        };
        Ok(bytes)
    }

    /// Decode from wire bytes. Signed is attempted first; falling back to
    /// plain is permitted and it is the caller's job to log the degradation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CrosslockError> {
        if let Ok(signed) = serde_json::from_slice::<SignedEnvelope>(bytes) {
            return Ok(Envelope::Signed(signed));
        }
        let plain = serde_json::from_slice::<PlainEnvelope>(bytes)?;
        Ok(Envelope::Plain(plain))
    }
}

// ── Payload bodies ───────────────────────────────────────────────────────────

/// Signed broadcast asking the maker of `order_id` to reveal details on a
/// directed stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub order_id: OrderId,
    pub timestamp: Timestamp,
}

/// ECIES-sealed `OrderDetails` addressed to one requester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedOrderDetails {
    pub order_id: OrderId,
    pub sealed: SealedBlob,
}

/// ECIES-sealed `ProposalTerms` addressed to the maker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedProposal {
    pub order_id: OrderId,
    pub sealed: SealedBlob,
}

/// ECIES-sealed `AcceptanceNotice` addressed to the proposer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedAcceptance {
    pub proposal_id: ProposalId,
    pub sealed: SealedBlob,
}

/// Every message body the protocol speaks, tagged by the envelope's `type`
/// string. The decoder is exhaustive: adding a variant without handling it
/// everywhere is a compile error.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    OrderAnnouncement(OrderAnnouncement),
    OrderRequest(OrderRequest),
    OrderDetails(OrderDetails),
    EncryptedOrderDetails(SealedOrderDetails),
    Proposal(ProposalTerms),
    EncryptedProposal(SealedProposal),
    EncryptedAcceptance(SealedAcceptance),
    Rejection(RejectionNotice),
}

impl Payload {
    /// Wire discriminator carried in the envelope `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::OrderAnnouncement(_) => "order_announcement",
            Payload::OrderRequest(_) => "order_request",
            Payload::OrderDetails(_) => "order_details",
            Payload::EncryptedOrderDetails(_) => "encrypted_order_details",
            Payload::Proposal(_) => "proposal",
            Payload::EncryptedProposal(_) => "encrypted_proposal",
            Payload::EncryptedAcceptance(_) => "encrypted_acceptance",
            Payload::Rejection(_) => "rejection",
        }
    }

    /// JSON body bytes carried opaquely in the envelope payload.
    pub fn encode_body(&self) -> Result<Vec<u8>, CrosslockError> {
        let bytes = match self {
            Payload::OrderAnnouncement(b) => serde_json::to_vec(b)?,
            Payload::OrderRequest(b) => serde_json::to_vec(b)?,
            Payload::OrderDetails(b) => serde_json::to_vec(b)?,
            Payload::EncryptedOrderDetails(b) => serde_json::to_vec(b)?,
            Payload::Proposal(b) => serde_json::to_vec(b)?,
            Payload::EncryptedProposal(b) => serde_json::to_vec(b)?,
            Payload::EncryptedAcceptance(b) => serde_json::to_vec(b)?,
            Payload::Rejection(b) => serde_json::to_vec(b)?,
        };
        Ok(bytes)
    }

    pub fn decode(kind: &str, body: &[u8]) -> Result<Self, CrosslockError> {
        Ok(match kind {
            "order_announcement" => Payload::OrderAnnouncement(serde_json::from_slice(body)?),
            "order_request" => Payload::OrderRequest(serde_json::from_slice(body)?),
            "order_details" => Payload::OrderDetails(serde_json::from_slice(body)?),
            "encrypted_order_details" => {
                Payload::EncryptedOrderDetails(serde_json::from_slice(body)?)
            }
            "proposal" => Payload::Proposal(serde_json::from_slice(body)?),
            "encrypted_proposal" => Payload::EncryptedProposal(serde_json::from_slice(body)?),
            "encrypted_acceptance" => Payload::EncryptedAcceptance(serde_json::from_slice(body)?),
            "rejection" => Payload::Rejection(serde_json::from_slice(body)?),
            other => {
                return Err(CrosslockError::Serialization(format!(
                    "unknown message type: {other}"
                )))
            }
        })
    }
}
