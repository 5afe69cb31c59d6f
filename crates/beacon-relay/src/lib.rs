//! Beacon Relay Server
//!
//! Credential-gated UDP relay for peers that cannot establish a direct
//! path. Clients authenticate every transaction with a long-term
//! credential; a successful allocation binds a fresh relay endpoint whose
//! address is handed back to the client. Datagrams are then copied
//! verbatim between the relay endpoint and the client's real address.
//!
//! One UDP socket serves all clients; control transactions are framed
//! behind a magic prefix, everything else on the socket is relayed data.

pub mod allocation;
pub mod auth;
pub mod proto;
pub mod server;

pub use allocation::{Allocation, RelayAllocator};
pub use auth::{CredentialAuthority, CredentialLookup, StaticCredentials};
pub use proto::{Request, RequestFrame, Response, ResponseFrame};
pub use server::RelayServer;
