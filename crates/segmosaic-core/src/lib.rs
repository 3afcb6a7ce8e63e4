pub mod consts;
pub mod detect;
pub mod error;
pub mod frame;
pub mod io;
pub mod layout;
pub mod mosaic;
pub mod recenter;
pub mod register;
pub mod session;
pub mod stats;
pub mod transform;
