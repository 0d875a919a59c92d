//! The `null` muxer: accepts everything, writes nothing.

use std::io::Write;

use mediaflow_core::{Packet, Result, Stream};

use crate::traits::MuxBackend;

#[derive(Debug, Default)]
pub struct NullMuxer {
    packets: u64,
}

impl NullMuxer {
    pub fn create() -> Box<dyn MuxBackend> {
        Box::<Self>::default()
    }
}

impl MuxBackend for NullMuxer {
    fn write_header(&mut self, _io: &mut dyn Write, _streams: &[Stream]) -> Result<()> {
        Ok(())
    }

    fn write_packet(&mut self, _io: &mut dyn Write, _packet: &Packet) -> Result<()> {
        self.packets += 1;
        Ok(())
    }

    fn write_trailer(&mut self, _io: &mut dyn Write, _streams: &[Stream]) -> Result<()> {
        tracing::debug!(packets = self.packets, "null muxer discarded packets");
        Ok(())
    }
}
