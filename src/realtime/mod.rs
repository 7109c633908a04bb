//! Outbound realtime speech-API link: wire events and connection setup.

pub mod events;
pub mod link;
