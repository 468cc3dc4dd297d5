//! Driver for daisy-chained MAX7219 8x8 LED modules (FC16 wiring).
//!
//! The chain is driven as one `modules * 8` by 8 pixel panel. Drawing only
//! touches the in-memory frame; [`MatrixPanel::flush`] sends it row by row,
//! one SPI transaction per row covering every module.

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_hal::spi::SpiDevice;
use log::debug;
use thiserror_no_std::Error;

use super::scroller::MatrixPanel;

/// Longest chain the frame buffer is sized for
pub const MAX_MODULES: usize = 32;

const ROWS: usize = 8;

mod reg {
    pub const DIGIT0: u8 = 0x01;
    pub const DECODE_MODE: u8 = 0x09;
    pub const INTENSITY: u8 = 0x0A;
    pub const SCAN_LIMIT: u8 = 0x0B;
    pub const SHUTDOWN: u8 = 0x0C;
    pub const DISPLAY_TEST: u8 = 0x0F;
}

#[derive(Error, Debug)]
pub enum MatrixError<E> {
    #[error("SPI transfer failed: {0:?}")]
    Spi(E),
}

pub struct Max7219Chain<SPI> {
    spi: SPI,
    modules: usize,
    /// One byte per row per module; bit 7 is the module's leftmost column.
    frame: [[u8; ROWS]; MAX_MODULES],
    /// Scratch space for one register write to every module
    tx: [u8; MAX_MODULES * 2],
}

impl<SPI> Max7219Chain<SPI>
where
    SPI: SpiDevice,
{
    /// Wrap a chain of `modules` devices. The count is clamped to 1..=[`MAX_MODULES`].
    pub fn new(spi: SPI, modules: usize) -> Self {
        Self {
            spi,
            modules: modules.clamp(1, MAX_MODULES),
            frame: [[0; ROWS]; MAX_MODULES],
            tx: [0; MAX_MODULES * 2],
        }
    }

    /// Wake every module into raw (no decode) mode and blank it.
    pub fn init(&mut self, intensity: u8) -> Result<(), MatrixError<SPI::Error>> {
        debug!(" Initialising {} MAX7219 modules", self.modules);
        self.write_all(reg::DISPLAY_TEST, 0)?;
        self.write_all(reg::SCAN_LIMIT, 7)?;
        self.write_all(reg::DECODE_MODE, 0)?;
        self.set_intensity(intensity)?;
        self.frame = [[0; ROWS]; MAX_MODULES];
        self.flush()?;
        self.write_all(reg::SHUTDOWN, 1)
    }

    /// Brightness from 0 to 15; larger values saturate.
    pub fn set_intensity(&mut self, intensity: u8) -> Result<(), MatrixError<SPI::Error>> {
        self.write_all(reg::INTENSITY, intensity.min(15))
    }

    /// Put every module in low-power shutdown.
    pub fn shutdown(&mut self) -> Result<(), MatrixError<SPI::Error>> {
        self.write_all(reg::SHUTDOWN, 0)
    }

    pub fn modules(&self) -> usize {
        self.modules
    }

    pub fn release(self) -> SPI {
        self.spi
    }

    fn write_all(&mut self, register: u8, value: u8) -> Result<(), MatrixError<SPI::Error>> {
        for pair in self.tx[..self.modules * 2].chunks_exact_mut(2) {
            pair[0] = register;
            pair[1] = value;
        }
        self.spi
            .write(&self.tx[..self.modules * 2])
            .map_err(MatrixError::Spi)
    }

    fn set_pixel(&mut self, x: usize, y: usize, on: bool) {
        let mask = 0x80 >> (x % 8);
        let row = &mut self.frame[x / 8][y];
        if on {
            *row |= mask;
        } else {
            *row &= !mask;
        }
    }
}

impl<SPI> OriginDimensions for Max7219Chain<SPI> {
    fn size(&self) -> Size {
        Size::new((self.modules * 8) as u32, ROWS as u32)
    }
}

impl<SPI> DrawTarget for Max7219Chain<SPI>
where
    SPI: SpiDevice,
{
    type Color = BinaryColor;
    type Error = MatrixError<SPI::Error>;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let width = self.modules * 8;
        for Pixel(point, color) in pixels {
            if point.x >= 0 && point.y >= 0 && (point.x as usize) < width && (point.y as usize) < ROWS
            {
                self.set_pixel(point.x as usize, point.y as usize, color.is_on());
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        let fill = if color.is_on() { 0xFF } else { 0x00 };
        self.frame = [[fill; ROWS]; MAX_MODULES];
        Ok(())
    }
}

impl<SPI> MatrixPanel for Max7219Chain<SPI>
where
    SPI: SpiDevice,
{
    fn flush(&mut self) -> Result<(), Self::Error> {
        // The leftmost module is the farthest from the controller, so its
        // bytes are shifted out first.
        for row in 0..ROWS {
            for module in 0..self.modules {
                self.tx[module * 2] = reg::DIGIT0 + row as u8;
                self.tx[module * 2 + 1] = self.frame[module][row];
            }
            self.spi
                .write(&self.tx[..self.modules * 2])
                .map_err(MatrixError::Spi)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use core::convert::Infallible;
    use embedded_hal::spi::{ErrorType, Operation};

    #[derive(Default)]
    struct RecordingSpi {
        writes: Vec<Vec<u8>>,
    }

    impl ErrorType for RecordingSpi {
        type Error = Infallible;
    }

    impl SpiDevice for RecordingSpi {
        fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
            for op in operations {
                if let Operation::Write(bytes) = op {
                    self.writes.push(bytes.to_vec());
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_size_follows_module_count() {
        let chain = Max7219Chain::new(RecordingSpi::default(), 16);
        assert_eq!(chain.size(), Size::new(128, 8));
        assert_eq!(Max7219Chain::new(RecordingSpi::default(), 99).modules(), MAX_MODULES);
    }

    #[test]
    fn test_init_configures_every_module() {
        let mut chain = Max7219Chain::new(RecordingSpi::default(), 2);
        chain.init(1).unwrap();

        let writes = &chain.spi.writes;
        assert!(writes.contains(&alloc::vec![reg::INTENSITY, 1, reg::INTENSITY, 1]));
        assert!(writes.contains(&alloc::vec![reg::SCAN_LIMIT, 7, reg::SCAN_LIMIT, 7]));
        assert_eq!(writes.last(), Some(&alloc::vec![reg::SHUTDOWN, 1, reg::SHUTDOWN, 1]));
    }

    #[test]
    fn test_intensity_saturates() {
        let mut chain = Max7219Chain::new(RecordingSpi::default(), 1);
        chain.set_intensity(200).unwrap();
        assert_eq!(chain.spi.writes[0], [reg::INTENSITY, 15]);
    }

    #[test]
    fn test_flush_maps_pixels_to_modules_and_bits() {
        let mut chain = Max7219Chain::new(RecordingSpi::default(), 2);
        Pixel(Point::new(0, 0), BinaryColor::On).draw(&mut chain).unwrap();
        Pixel(Point::new(9, 3), BinaryColor::On).draw(&mut chain).unwrap();
        // Off the panel: ignored.
        Pixel(Point::new(16, 0), BinaryColor::On).draw(&mut chain).unwrap();
        chain.flush().unwrap();

        let writes = &chain.spi.writes;
        assert_eq!(writes.len(), 8, "one transaction per row");
        assert_eq!(writes[0], [reg::DIGIT0, 0x80, reg::DIGIT0, 0x00]);
        assert_eq!(writes[3], [reg::DIGIT0 + 3, 0x00, reg::DIGIT0 + 3, 0x40]);
    }

    #[test]
    fn test_clear_blanks_frame() {
        let mut chain = Max7219Chain::new(RecordingSpi::default(), 1);
        chain.clear(BinaryColor::On).unwrap();
        chain.clear(BinaryColor::Off).unwrap();
        chain.flush().unwrap();
        assert!(chain.spi.writes.iter().all(|w| w[1] == 0));
    }
}
