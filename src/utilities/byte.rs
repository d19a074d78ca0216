// Copyright (C) 2024 Bellande Artificial Intelligence Computer Vision Research Innovation Center, Ronaldson Bellande

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::io::{self, Read};

pub trait ReadBytes: Read {
    #[inline]
    fn read_u8(&mut self) -> io::Result<u8> {
        let mut buf = [0; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16<T: Byte>(&mut self) -> io::Result<u16> {
        let mut buf = [0; 2];
        self.read_exact(&mut buf)?;
        Ok(T::read_u16(&buf))
    }

    fn read_u32<T: Byte>(&mut self) -> io::Result<u32> {
        let mut buf = [0; 4];
        self.read_exact(&mut buf)?;
        Ok(T::read_u32(&buf))
    }

    fn read_i32<T: Byte>(&mut self) -> io::Result<i32> {
        Ok(self.read_u32::<T>()? as i32)
    }

    fn read_u64<T: Byte>(&mut self) -> io::Result<u64> {
        let mut buf = [0; 8];
        self.read_exact(&mut buf)?;
        Ok(T::read_u64(&buf))
    }

    fn read_f64<T: Byte>(&mut self) -> io::Result<f64> {
        Ok(f64::from_bits(self.read_u64::<T>()?))
    }

    /// Reads exactly `len` bytes into a fresh buffer.
    fn read_vec(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        (&mut *self).take(len as u64).read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {} bytes, got {}", len, buf.len()),
            ));
        }
        Ok(buf)
    }

    /// Reads up to and excluding the next `\n`.
    fn read_line_bytes(&mut self) -> io::Result<Vec<u8>> {
        let mut line = Vec::new();
        loop {
            match self.read_u8()? {
                b'\n' => return Ok(line),
                byte => line.push(byte),
            }
        }
    }
}

impl<R: Read + ?Sized> ReadBytes for R {}

pub trait Byte {
    fn read_u16(buf: &[u8]) -> u16;
    fn read_u32(buf: &[u8]) -> u32;
    fn read_u64(buf: &[u8]) -> u64;
}

pub enum BigEndian {}

impl Byte for BigEndian {
    #[inline]
    fn read_u16(buf: &[u8]) -> u16 {
        u16::from_be_bytes([buf[0], buf[1]])
    }

    #[inline]
    fn read_u32(buf: &[u8]) -> u32 {
        u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
    }

    #[inline]
    fn read_u64(buf: &[u8]) -> u64 {
        let mut bytes = [0; 8];
        bytes.copy_from_slice(&buf[..8]);
        u64::from_be_bytes(bytes)
    }
}

pub enum LittleEndian {}

impl Byte for LittleEndian {
    #[inline]
    fn read_u16(buf: &[u8]) -> u16 {
        u16::from_le_bytes([buf[0], buf[1]])
    }

    #[inline]
    fn read_u32(buf: &[u8]) -> u32 {
        u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
    }

    #[inline]
    fn read_u64(buf: &[u8]) -> u64 {
        let mut bytes = [0; 8];
        bytes.copy_from_slice(&buf[..8]);
        u64::from_le_bytes(bytes)
    }
}
