use std::fmt;

use rand::RngCore;

/// Length of an OpenVPN session id in bytes.
pub const SESSION_ID_LEN: usize = 8;

/// Client session id carried by the probe.
///
/// Generated fresh for every probe so that middleboxes never see two
/// identical packets.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct SessionId([u8; SESSION_ID_LEN]);

impl SessionId {
    pub fn new(bytes: [u8; SESSION_ID_LEN]) -> SessionId {
        SessionId(bytes)
    }

    pub fn random() -> SessionId {
        let mut bytes = [0u8; SESSION_ID_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        SessionId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_ID_LEN] {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SessionId({})", hex::encode(self.0))
    }
}
