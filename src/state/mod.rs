//! Shared server state.

mod channel;
mod masks;
mod matrix;
mod uid;
mod user;
mod whowas;

pub use channel::{Channel, ChannelFlags, JoinDenied, MemberModes, Topic};
pub use masks::MaskSet;
pub use matrix::{Matrix, ServerInfo, SharedConfig};
pub use uid::{Uid, UidGenerator};
pub use user::{User, UserFlags};
pub use whowas::{WhoWas, WhoWasList};
