//! Endpoint derivation
//!
//! Both ends of a burrow meet on the relay at a port derived from a shared
//! host identifier, so no coordination beyond the identifier is needed.

use std::net::{Ipv4Addr, TcpListener};
use std::path::Path;

use tracing::debug;
use uuid::Uuid;

use crate::error::ConfigError;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Resolve a raw host identifier.
///
/// If `raw` names a readable file its contents are the identifier, taken
/// verbatim (trailing newline included). Otherwise `raw` must itself be a
/// UUID.
pub fn resolve_host_id(raw: &str) -> Result<String, ConfigError> {
    if !raw.is_empty() {
        match std::fs::read_to_string(Path::new(raw)) {
            Ok(contents) => {
                debug!("Read host id from file {}", raw);
                return Ok(contents);
            }
            Err(e) => debug!("Host id {:?} is not a readable file: {}", raw, e),
        }
    }

    Uuid::parse_str(raw)
        .map(|_| raw.to_string())
        .map_err(|_| ConfigError::InvalidHostId)
}

/// FNV-1 32-bit hash (multiply, then xor).
fn fnv1_32(data: &[u8]) -> u32 {
    data.iter()
        .fold(FNV_OFFSET_BASIS, |hash, &b| hash.wrapping_mul(FNV_PRIME) ^ u32::from(b))
}

/// Derive the relay port for an identifier.
pub fn derive_port(identifier: &str) -> u16 {
    (fnv1_32(identifier.as_bytes()) % 65536) as u16
}

/// Resolve `raw` and derive the relay port both ends meet on.
///
/// Port 0 asks the relay for an ephemeral port, which the other end could
/// never find, so identifiers deriving it are rejected.
pub fn host_port(raw: &str) -> Result<u16, ConfigError> {
    let id = resolve_host_id(raw)?;
    match derive_port(&id) {
        0 => Err(ConfigError::Invalid(
            "host id derives relay port 0, choose another id".to_string(),
        )),
        port => Ok(port),
    }
}

/// Ask the OS for a currently unused loopback TCP port.
///
/// The port is released before returning, so another process may grab it
/// first.
pub fn free_local_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_fnv1_vectors() {
        assert_eq!(fnv1_32(b""), 0x811c_9dc5);
        assert_eq!(fnv1_32(b"a"), 0x050c_5d7e);
        assert_eq!(fnv1_32(b"foobar"), 0x31f0_b262);
    }

    #[test]
    fn test_derive_port_vectors() {
        assert_eq!(derive_port(""), 0x9dc5);
        assert_eq!(derive_port("a"), 0x5d7e);
        assert_eq!(derive_port("foobar"), 0xb262);
    }

    #[test]
    fn test_derive_port_is_stable() {
        let id = "0b6c0a7e-5a3f-4f8a-9d55-0a8f1a2f7c11";
        assert_eq!(derive_port(id), derive_port(id));
        assert_eq!(derive_port(id), derive_port(&id.to_string()));
    }

    #[test]
    fn test_resolve_uuid() {
        let id = "0b6c0a7e-5a3f-4f8a-9d55-0a8f1a2f7c11";
        assert_eq!(resolve_host_id(id).unwrap(), id);
    }

    #[test]
    fn test_resolve_file_verbatim() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "my-secret-id\n").unwrap();

        let id = resolve_host_id(file.path().to_str().unwrap()).unwrap();
        assert_eq!(id, "my-secret-id\n");
    }

    #[test]
    fn test_resolve_invalid() {
        assert!(matches!(
            resolve_host_id("not-a-uuid"),
            Err(ConfigError::InvalidHostId)
        ));
        assert!(matches!(resolve_host_id(""), Err(ConfigError::InvalidHostId)));
    }

    #[test]
    fn test_host_and_connect_agree() {
        let id = "0b6c0a7e-5a3f-4f8a-9d55-0a8f1a2f7c11";
        let host_side = derive_port(&resolve_host_id(id).unwrap());
        let connect_side = derive_port(&resolve_host_id(id).unwrap());
        assert_eq!(host_side, connect_side);
    }

    #[test]
    fn test_host_port_rejects_zero() {
        // FNV-1 of "id-35768" is 0 mod 65536
        assert_eq!(derive_port("id-35768"), 0);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "id-35768").unwrap();
        let err = host_port(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("port 0")));

        let id = "0b6c0a7e-5a3f-4f8a-9d55-0a8f1a2f7c11";
        assert_eq!(host_port(id).unwrap(), derive_port(id));
    }

    #[test]
    fn test_free_local_port() {
        let port = free_local_port().unwrap();
        assert_ne!(port, 0);
        // Released, so it can be bound again
        TcpListener::bind((Ipv4Addr::LOCALHOST, port)).unwrap();
    }
}
