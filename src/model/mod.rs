pub mod attendance;
pub mod role;
pub mod shift;
