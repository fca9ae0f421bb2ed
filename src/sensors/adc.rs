//! Flowmeter ADC latch.
//!
//! The external 16-bit ADC converts all five flowmeter channels on each
//! CONVST pulse and drops BUSY when done.  On BUSY the frame (ten bytes,
//! five big-endian words) is shifted off the SPI bus into this latch; the
//! main loop reads the codes and consumes the `fresh` flag.

use core::sync::atomic::{AtomicBool, AtomicI16, Ordering};

use embedded_hal::spi::SpiDevice;

/// Bytes per acquisition frame.
pub const FRAME_LEN: usize = 10;

/// Last acquired raw code per channel.  All zero before the first frame.
pub struct AdcLatch {
    codes: [AtomicI16; 5],
    fresh: AtomicBool,
}

impl AdcLatch {
    pub const fn new() -> Self {
        Self {
            codes: [const { AtomicI16::new(0) }; 5],
            fresh: AtomicBool::new(false),
        }
    }

    /// Shift one frame off the bus and latch it.  Chip select is the
    /// device's business.
    pub fn harvest<S: SpiDevice>(&self, spi: &mut S) -> Result<(), S::Error> {
        let mut frame = [0_u8; FRAME_LEN];
        spi.read(&mut frame)?;
        self.store_frame(&frame);
        Ok(())
    }

    pub fn store_frame(&self, frame: &[u8; FRAME_LEN]) {
        for (code, word) in self.codes.iter().zip(frame.chunks_exact(2)) {
            code.store(i16::from_be_bytes([word[0], word[1]]), Ordering::Relaxed);
        }
        self.fresh.store(true, Ordering::Release);
    }

    /// True once per latched frame.
    pub fn take_fresh(&self) -> bool {
        self.fresh.swap(false, Ordering::Acquire)
    }

    pub fn code(&self, channel: usize) -> i16 {
        self.codes[channel].load(Ordering::Relaxed)
    }

    pub fn codes(&self) -> [i16; 5] {
        core::array::from_fn(|ch| self.code(ch))
    }
}

impl Default for AdcLatch {
    fn default() -> Self {
        Self::new()
    }
}
