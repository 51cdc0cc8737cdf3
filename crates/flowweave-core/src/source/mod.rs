mod export;

pub use export::ExportFileSource;

use thiserror::Error;

/// One packet record normalized from the capture field export.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketRecord {
    pub ts: f64,
    pub src_addr: String,
    pub dst_addr: String,
    pub ports: Ports,
    pub protocol: String,
    pub frame_len: u64,
}

/// Transport ports of a record, resolved once at parse time. A record
/// carries one full TCP pair, one full UDP pair, or no ports at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ports {
    Tcp { src: u16, dst: u16 },
    Udp { src: u16, dst: u16 },
    None,
}

impl Ports {
    pub fn src(&self) -> Option<u16> {
        match self {
            Ports::Tcp { src, .. } | Ports::Udp { src, .. } => Some(*src),
            Ports::None => None,
        }
    }

    pub fn dst(&self) -> Option<u16> {
        match self {
            Ports::Tcp { dst, .. } | Ports::Udp { dst, .. } => Some(*dst),
            Ports::None => None,
        }
    }
}

pub trait RecordSource {
    fn next_record(&mut self) -> Result<Option<PacketRecord>, SourceError>;

    /// Input rows this source rejected so far.
    fn skipped(&self) -> u64 {
        0
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
