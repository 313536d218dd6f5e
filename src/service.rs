//! The narrow interface the session core hands non-transport traffic to.
//!
//! Once `SSH_MSG_SERVICE_REQUEST`/`SSH_MSG_SERVICE_ACCEPT` has named a
//! service, every packet outside the transport/KEX opcode ranges is handed
//! to that service's [`Service::process`] until it is replaced or the
//! session closes. Concrete services (`ssh-userauth`, `ssh-connection`) are
//! external collaborators; this crate only defines the seam.

use crate::error::Result;

/// A running upstream service bound to one session.
pub trait Service: Send {
    /// Handle one packet addressed to this service.
    fn process(&mut self, cmd: u8, payload: &[u8]) -> Result<()>;
}

/// Produces a [`Service`] by the name carried in `SSH_MSG_SERVICE_REQUEST`.
pub trait ServiceFactory: Send + Sync {
    /// Instantiate the service named `name`, or `None` if this session
    /// doesn't offer it.
    fn create(&self, name: &str) -> Option<Box<dyn Service>>;
}

/// A [`ServiceFactory`] that never offers any service, the default for a
/// session that only needs the transport layer (e.g. a test harness).
pub struct NoServices;

impl ServiceFactory for NoServices {
    fn create(&self, _name: &str) -> Option<Box<dyn Service>> {
        None
    }
}
