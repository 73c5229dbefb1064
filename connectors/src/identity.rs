use std::path::Path;

use ic_agent::Identity;
use ic_agent::identity::{BasicIdentity, Secp256k1Identity};

use crate::error::{ConnectorError, ConnectorResult};

/// Loads an Ed25519 or secp256k1 identity from a PEM file.
pub fn create_identity_from_pem_file(pem_file: &Path) -> ConnectorResult<Box<dyn Identity>> {
    match BasicIdentity::from_pem_file(pem_file) {
        Ok(identity) => Ok(Box::new(identity)),
        Err(_) => match Secp256k1Identity::from_pem_file(pem_file) {
            Ok(identity) => Ok(Box::new(identity)),
            Err(err) => Err(ConnectorError::Identity {
                path: pem_file.display().to_string(),
                message: format!("unknown identity format. {err}"),
            }),
        },
    }
}
