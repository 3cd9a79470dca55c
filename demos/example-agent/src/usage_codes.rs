//! Usage metric codes for the example integration.
//!
//! Integration codes start at 51. Append new codes; never renumber.

pub const EXAMPLE_FAST_SERVICE_ERROR: i32 = 51;
pub const EXAMPLE_SLOW_SERVICE_ERROR: i32 = 52;
pub const EXAMPLE_COMMUNICATION_ERROR: i32 = 53;

pub const EXAMPLE_ECHO_STARTED: i32 = 51;
pub const EXAMPLE_ECHO_FINISHED: i32 = 52;
