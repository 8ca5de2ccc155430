//! Exit codes for `imgtrust`.
//! These codes are part of the public contract; scripts branch on them.

pub const SUCCESS: i32 = 0; // Verified
pub const REJECTED: i32 = 1; // Ran to a decision, image not trusted
pub const USAGE_ERROR: i32 = 2; // Bad flags, unreadable or unusable key
pub const TRANSPORT_ERROR: i32 = 3; // Log or registry unreachable
pub const DEADLINE_EXCEEDED: i32 = 4;
