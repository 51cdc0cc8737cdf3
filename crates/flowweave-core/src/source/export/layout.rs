// Column order of the capture field export, one packet per line:
// frame.time_epoch, ip.src, ip.dst, tcp.srcport, tcp.dstport,
// udp.srcport, udp.dstport, ip.proto, frame.len

pub const SEPARATOR: char = ',';
pub const COLUMN_COUNT: usize = 9;

pub const TIMESTAMP_IDX: usize = 0;
pub const SRC_ADDR_IDX: usize = 1;
pub const DST_ADDR_IDX: usize = 2;
pub const TCP_SRC_PORT_IDX: usize = 3;
pub const TCP_DST_PORT_IDX: usize = 4;
pub const UDP_SRC_PORT_IDX: usize = 5;
pub const UDP_DST_PORT_IDX: usize = 6;
pub const PROTOCOL_IDX: usize = 7;
pub const FRAME_LEN_IDX: usize = 8;
