//! omb-tabs: session and tab bookkeeping for onemanband.
//!
//! [`TabStore`] keeps, per session, the ordered tab list, the active and
//! last-active tab and a label counter. It is a plain `&mut self` state
//! machine; the app serializes access behind one lock.

pub mod session;
pub mod store;
pub mod tab;

pub use session::{Session, SessionId, SessionKind};
pub use store::{SessionTabs, TabStore};
pub use tab::{Change, Tab, TabId};
