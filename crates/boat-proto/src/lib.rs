//! Wire format shared by every BoatNode: the fixed-layout report frame,
//! its CRC, and the fix sample the reporting path is built from.

pub mod crc;
pub mod fix;
pub mod packet;

pub use fix::{Fix, FixSource};
pub use packet::{Frame, Rejected, ReportPacket, FRAME_LEN};
