pub mod call;

pub use call::incoming_call;
