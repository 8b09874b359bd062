//! Definitions of types used inside boxes.
//!
//! This module contains fundamental types used in boxes (such as Time,
//! ZString, FourCC, etc).
//!
use std::convert::TryInto;
use std::fmt::{Debug, Display, Write};
use std::io;

use chrono::offset::{Local, TimeZone};
use serde::Serialize;

use crate::isobox::FullBox;
use crate::serialize::{FromBytes, ReadBytes, ToBytes, WriteBytes};

// Convenience macro to implement FromBytes/ToBytes for newtypes.
macro_rules! def_from_to_bytes_newtype {
    ($newtype:ident, $type:ty) => {
        impl FromBytes for $newtype {
            fn from_bytes<R: ReadBytes>(bytes: &mut R) -> io::Result<Self> {
                let res = <$type>::from_bytes(bytes)?;
                Ok($newtype(res))
            }
            fn min_size() -> usize {
                <$type>::min_size()
            }
        }
        impl ToBytes for $newtype {
            fn to_bytes<W: WriteBytes>(&self, bytes: &mut W) -> io::Result<()> {
                self.0.to_bytes(bytes)
            }
        }
    };
}

// 32 bits in a version 0 box, 64 bits in a version 1 box.
macro_rules! def_from_to_bytes_versioned {
    ($newtype:ident) => {
        def_from_to_bytes_versioned!($newtype, 0xffffffff);
    };
    ($newtype:ident, $max:expr) => {
        impl FromBytes for $newtype {
            fn from_bytes<R: ReadBytes>(bytes: &mut R) -> io::Result<Self> {
                Ok(match bytes.version() {
                    1 => $newtype(u64::from_bytes(bytes)?),
                    _ => $newtype(u32::from_bytes(bytes)? as u64),
                })
            }
            fn min_size() -> usize {
                u32::min_size()
            }
        }
        impl ToBytes for $newtype {
            fn to_bytes<W: WriteBytes>(&self, bytes: &mut W) -> io::Result<()> {
                match bytes.version() {
                    1 => self.0.to_bytes(bytes)?,
                    _ => (std::cmp::min(self.0, $max as u64) as u32).to_bytes(bytes)?,
                }
                Ok(())
            }
        }
        impl FullBox for $newtype {
            fn version(&self) -> Option<u8> {
                if self.0 <= $max {
                    None
                } else {
                    Some(1)
                }
            }
        }
        impl From<$newtype> for u64 {
            fn from(t: $newtype) -> u64 {
                t.0
            }
        }
        impl From<u64> for $newtype {
            fn from(t: u64) -> $newtype {
                $newtype(t)
            }
        }
    };
}

/// The optional "usertype" of a `uuid` box.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Uuid(pub [u8; 16]);

impl FromBytes for Uuid {
    fn from_bytes<R: ReadBytes>(bytes: &mut R) -> io::Result<Self> {
        let data = bytes.read(16)?;
        let mut u = [0u8; 16];
        u.copy_from_slice(data);
        Ok(Uuid(u))
    }

    fn min_size() -> usize {
        16
    }
}

impl ToBytes for Uuid {
    fn to_bytes<W: WriteBytes>(&self, bytes: &mut W) -> io::Result<()> {
        bytes.write(&self.0[..])
    }
}

impl Display for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // 8-4-4-4-12
        let p1 = u32::from_be_bytes((self.0)[0..4].try_into().unwrap());
        let p2 = u16::from_be_bytes((self.0)[4..6].try_into().unwrap());
        let p3 = u16::from_be_bytes((self.0)[6..8].try_into().unwrap());
        let p4 = u16::from_be_bytes((self.0)[8..10].try_into().unwrap());
        let p5 = u16::from_be_bytes((self.0)[10..12].try_into().unwrap());
        let p6 = u32::from_be_bytes((self.0)[12..16].try_into().unwrap());
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:04x}{:08x}",
            p1, p2, p3, p4, p5, p6
        )
    }
}

impl Debug for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

/// Basically a blob of data.
#[derive(Clone, Default)]
pub struct Data(pub Vec<u8>);

impl Data {
    /// Read an exact number of bytes.
    pub fn read<R: ReadBytes>(stream: &mut R, count: usize) -> io::Result<Self> {
        let mut v = Vec::new();
        if count > 0 {
            let data = stream.read(count as u64)?;
            v.extend_from_slice(data);
        }
        Ok(Data(v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromBytes for Data {
    fn from_bytes<R: ReadBytes>(bytes: &mut R) -> io::Result<Self> {
        let left = bytes.left();
        let data = bytes.read(left)?;
        Ok(Data(data.to_vec()))
    }

    fn min_size() -> usize {
        0
    }
}

impl ToBytes for Data {
    fn to_bytes<W: WriteBytes>(&self, bytes: &mut W) -> io::Result<()> {
        bytes.write(&self.0[..])
    }
}

impl Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.0.len() <= 16 {
            let mut s = String::from("[");
            let mut first = true;
            for d in &self.0 {
                if !first {
                    s.push(' ');
                }
                first = false;
                let _ = write!(s, "{:02x}", d);
            }
            s.push(']');
            write!(f, "{}", s)
        } else {
            write!(f, "[u8; {}]", &self.0.len())
        }
    }
}

/// 32 bits in boxes with version 0, and 64 bits in boxes with version >= 1.
#[derive(Clone, Copy, Default)]
pub struct VersionSizedUint(pub u64);
def_from_to_bytes_versioned!(VersionSizedUint);

impl Debug for VersionSizedUint {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

/// Duration_ is a 32/64 bit value where "all ones" means "unknown".
#[derive(Clone, Copy, Default)]
pub struct Duration_(pub u64);
def_from_to_bytes_versioned!(Duration_, 0x7fffffff);

impl Debug for Duration_ {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

/// Time is a 32/64 bit value, measured in seconds since 01-01-1904 00:00:00
#[derive(Clone, Copy, Default)]
pub struct Time(pub u64);
def_from_to_bytes_versioned!(Time);

// TZ=UTC date +%s -d "1904-01-01 00:00:00"
const OFFSET_TO_UNIX: u64 = 2082844800;

impl Time {
    fn to_unixtime(&self) -> i64 {
        (self.0 as i64) - (OFFSET_TO_UNIX as i64)
    }
    fn to_rfc3339(&self) -> String {
        Local.timestamp(self.to_unixtime(), 0).to_rfc3339()
    }
}

impl Debug for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self.to_rfc3339())
    }
}

/// FourCC is the 4-byte name of any box.
///
/// Usually this is four bytes of ASCII characters, but it could be anything.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCC(pub u32);
def_from_to_bytes_newtype!(FourCC, u32);

impl FourCC {
    pub const fn new(s: &[u8; 4]) -> FourCC {
        FourCC(u32::from_be_bytes(*s))
    }

    fn fmt_fourcc(&self, dbg: bool) -> String {
        let c = self.to_be_bytes();
        for i in 0..4 {
            if c[i] < 32 || c[i] > 126 {
                return format!("0x{:x}", self.0);
            }
        }
        let mut s = String::new();
        if dbg {
            s.push('"');
        }
        for i in 0..4 {
            s.push(c[i] as char);
        }
        if dbg {
            s.push('"');
        }
        s
    }

    #[inline]
    pub fn to_be_bytes(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

// Let if (fourcc == b"moov") .. work
impl std::cmp::PartialEq<&[u8]> for FourCC {
    fn eq(&self, other: &&[u8]) -> bool {
        &(self.to_be_bytes())[..] == *other
    }
}

// Let if (fourcc == b"moov") .. work
impl std::cmp::PartialEq<&[u8; 4]> for FourCC {
    fn eq(&self, other: &&[u8; 4]) -> bool {
        &self.to_be_bytes() == *other
    }
}

impl Debug for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.fmt_fourcc(true))
    }
}

impl Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.fmt_fourcc(false))
    }
}

impl From<&[u8; 4]> for FourCC {
    fn from(b: &[u8; 4]) -> FourCC {
        FourCC(u32::from_be_bytes(*b))
    }
}

impl Serialize for FourCC {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Language code ('eng', 'dut', 'fra', etc).
///
/// A 16-bit value containing 3 5-bit values that are interpreted as letters,
/// so that we get a 3-character country code.
#[derive(Clone, Copy, Serialize)]
pub struct IsoLanguageCode(pub u16);
def_from_to_bytes_newtype!(IsoLanguageCode, u16);

impl Display for IsoLanguageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut s = String::new();
        s.push((((self.0 >> 10) & 0x1f) + 0x60) as u8 as char);
        s.push((((self.0 >> 5) & 0x1f) + 0x60) as u8 as char);
        s.push(((self.0 & 0x1f) + 0x60) as u8 as char);
        write!(f, "{}", s)
    }
}

impl Debug for IsoLanguageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Default for IsoLanguageCode {
    fn default() -> IsoLanguageCode {
        // "und"
        IsoLanguageCode(0x55c4)
    }
}

/// Zero terminated ASCII string.
#[derive(Clone, Default)]
pub struct ZString(pub String);

impl ZString {
    pub fn new(s: &str) -> ZString {
        let mut s = s.to_string();
        if !s.ends_with('\0') {
            s.push('\0');
        }
        ZString(s)
    }

    pub fn as_str(&self) -> &str {
        let len = if self.0.ends_with('\0') {
            self.0.len() - 1
        } else {
            self.0.len()
        };
        &(self.0)[..len]
    }
}

impl std::ops::Deref for ZString {
    type Target = str;
    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl FromBytes for ZString {
    fn from_bytes<R: ReadBytes>(bytes: &mut R) -> io::Result<Self> {
        // Read up to and including the first NUL, or to the end of the box.
        let mut s = String::new();
        while bytes.left() > 0 {
            let b = bytes.read(1)?[0];
            s.push(b as char);
            if b == 0 {
                break;
            }
        }
        Ok(ZString(s))
    }
    fn min_size() -> usize {
        0
    }
}

impl ToBytes for ZString {
    fn to_bytes<W: WriteBytes>(&self, bytes: &mut W) -> io::Result<()> {
        let mut v = Vec::new();
        for c in self.0.chars() {
            if (c as u32) < 256 {
                v.push(c as u8);
            } else {
                v.push(0xff);
            }
        }
        bytes.write(&v)
    }
}

impl Display for ZString {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Debug for ZString {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "\"{}\"", self.as_str())
    }
}

impl Serialize for ZString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl PartialEq<&str> for ZString {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Transformation matrix (mvhd / tkhd).
#[derive(Clone)]
pub struct Matrix(pub [i32; 9]);

impl Matrix {
    /// The values in file order.
    pub fn values(&self) -> Vec<i32> {
        self.0.to_vec()
    }
}

impl Default for Matrix {
    fn default() -> Matrix {
        // Unity: 16.16 fixed point ones on the diagonal, 2.30 lower right.
        Matrix([0x10000, 0, 0, 0, 0x10000, 0, 0, 0, 0x40000000])
    }
}

impl FromBytes for Matrix {
    fn from_bytes<R: ReadBytes>(bytes: &mut R) -> io::Result<Self> {
        let mut m = [0i32; 9];
        for x in 0..9 {
            m[x] = i32::from_bytes(bytes)?;
        }
        Ok(Matrix(m))
    }
    fn min_size() -> usize {
        36
    }
}

impl ToBytes for Matrix {
    fn to_bytes<W: WriteBytes>(&self, bytes: &mut W) -> io::Result<()> {
        for x in 0..9 {
            (self.0)[x].to_bytes(bytes)?;
        }
        Ok(())
    }
}

impl Debug for Matrix {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Matrix([{:#x}][{:#x}][{:#x}] [{:#x}][{:#x}][{:#x}] [{:#x}][{:#x}][{:#x}])",
            self.0[0],
            self.0[1],
            self.0[2],
            self.0[3],
            self.0[4],
            self.0[5],
            self.0[6],
            self.0[7],
            self.0[8],
        )
    }
}

macro_rules! impl_flags {
    ($(#[$outer:meta])* $type:ident) => {
        $(#[$outer])*
        #[derive(Clone, Copy, Default)]
        pub struct $type(pub u32);

        impl FromBytes for $type {
            fn from_bytes<R: ReadBytes>(bytes: &mut R) -> io::Result<Self> {
                Ok($type(bytes.flags()))
            }
            fn min_size() -> usize {
                0
            }
        }

        impl ToBytes for $type {
            fn to_bytes<W: WriteBytes>(&self, _bytes: &mut W) -> io::Result<()> {
                Ok(())
            }
        }

        impl FullBox for $type {
            fn flags(&self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Debug for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "Flags({:#x})", self.0)
            }
        }

        impl $type {
            pub fn get(&self, bit: u32) -> bool {
                let mask = 1 << bit;
                self.0 & mask > 0
            }
            pub fn set(&mut self, bit: u32, on: bool) {
                if on {
                    self.0 |= 1u32 << bit;
                } else {
                    self.0 &= !(1u32 << bit)
                }
            }
        }
    };
}

impl_flags!(
    /// Generic 24 bits flags.
    Flags
);

macro_rules! fixed_float {
    ($(#[$outer:meta])* $name:ident, $type:tt, $frac_bits:expr) => {
        #[derive(Clone, Copy, Default)]
        $(#[$outer])*
        pub struct $name(pub $type);
        def_from_to_bytes_newtype!($name, $type);

        impl $name {
            pub fn get(&self) -> f64 {
                (self.0 as f64) / ((1 << $frac_bits) as f64)
            }

            pub fn set(&mut self, value: f64) {
                let v = (value * ((1 << $frac_bits) as f64)).round();
                self.0 = if v > (std::$type::MAX as f64) {
                    std::$type::MAX
                } else if v < (std::$type::MIN as f64) {
                    std::$type::MIN
                } else {
                    v as $type
                };
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{}", self.get())
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{}", self.get())
            }
        }

        impl From<f64> for $name {
            fn from(t: f64) -> $name {
                let mut x = $name(0);
                x.set(t);
                x
            }
        }

        impl From<$name> for f64 {
            fn from(t: $name) -> f64 {
                t.get()
            }
        }
    };
}

// Some fixed float types.
fixed_float!(
    /// 32 bits 16.16 fixed float.
    FixedFloat16_16,
    u32,
    16
);

fixed_float!(
    /// 16 bits 8.8 fixed float.
    FixedFloat8_8,
    u16,
    8
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SliceReader;

    #[test]
    fn fourcc_round_trip() {
        let cc = FourCC::new(b"hvc1");
        assert_eq!(cc.to_string(), "hvc1");
        assert_eq!(cc, b"hvc1");
        assert_eq!(cc.to_be_bytes(), *b"hvc1");
    }

    #[test]
    fn zstring_reads_to_nul() {
        let mut r = SliceReader::new(b"pict\0junk");
        let s = ZString::from_bytes(&mut r).unwrap();
        assert_eq!(s.as_str(), "pict");
        assert_eq!(r.left(), 4);
    }
}
