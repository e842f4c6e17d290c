//! Bitstream reading utilities for container and codec header parsing.
//!
//! Wraps `bitstream_io`'s big-endian reader with bounds-checked helpers that
//! report the failing bit position.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, UnsignedInteger};

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        if n as u64 > self.available()? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "get_n({}): out of bounds bits at {}",
                    n,
                    self.bs.position_in_bits().unwrap_or(0)
                ),
            ));
        }

        self.bs.read_unsigned_var(n)
    }

    /// Reads `N` whole bytes. The reader must be byte aligned.
    #[inline(always)]
    pub fn get_bytes<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        if (N as u64) << 3 > self.available()? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "get_bytes({}): out of bounds bits at {}",
                    N,
                    self.bs.position_in_bits().unwrap_or(0)
                ),
            ));
        }

        let mut buf = [0u8; N];
        self.bs.read_bytes(&mut buf)?;
        Ok(buf)
    }

    #[inline(always)]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        if n as u64 > self.available()? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "skip_n: out of bounds bits",
            ));
        }

        self.bs.skip(n)
    }

    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        self.bs
            .position_in_bits()
            .map(|pos| self.len.saturating_sub(pos))
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        let read = io::Cursor::new(buf);

        Self::new(read, len)
    }
}

impl Default for BsIoSliceReader<'_> {
    fn default() -> Self {
        Self::from_slice(&[])
    }
}

#[test]
fn reads_unaligned_fields() -> io::Result<()> {
    // 00010 0100 0010 000 = object type 2, index 4, channels 2
    let reader = &mut BsIoSliceReader::from_slice(&[0x12, 0x10]);

    assert_eq!(reader.get_n::<u8>(5)?, 2);
    assert_eq!(reader.get_n::<u8>(4)?, 4);
    assert_eq!(reader.get_n::<u8>(4)?, 2);
    assert_eq!(reader.available()?, 3);
    assert!(reader.get_n::<u8>(4).is_err());

    Ok(())
}

#[test]
fn byte_reads_respect_bounds() -> io::Result<()> {
    let reader = &mut BsIoSliceReader::from_slice(&[0xAA, 0xBB, 0xCC]);

    assert_eq!(reader.get_bytes::<2>()?, [0xAA, 0xBB]);
    assert_eq!(reader.position()?, 16);
    assert!(reader.get_bytes::<2>().is_err());
    reader.skip_n(8)?;
    assert_eq!(reader.available()?, 0);

    Ok(())
}
