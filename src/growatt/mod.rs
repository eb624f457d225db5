pub mod cipher;
pub mod dongle;
pub mod frame;
pub mod packet;
