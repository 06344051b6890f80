//! Request authorization for the Azure Blob Storage REST API.

mod shared_key;

pub use shared_key::*;

/// How requests to the service are authorized.
#[derive(Clone)]
pub enum Credential {
    /// Sign every request with the account key.
    SharedKey(SharedKeyCredential),
    /// Append a shared access signature to every URL.
    SasToken(String),
    /// Send requests unsigned (public containers, local emulators with loose auth).
    Anonymous,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        match self {
            Credential::SharedKey(c) => write!(f, "SharedKey({})", c.account()),
            Credential::SasToken(_) => write!(f, "SasToken(..)"),
            Credential::Anonymous => write!(f, "Anonymous"),
        }
    }
}
