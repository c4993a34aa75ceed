//! Fixed-width opaque byte values used for hashes, identifiers and keys

use std::{
    fmt,
    io::{self, Read, Write},
    str::FromStr,
};

macro_rules! fixed_bytes {
    ($name:ident, $len:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// All-zero value
            pub const ZERO: Self = Self([0u8; $len]);
            /// Width in bytes
            pub const LEN: usize = $len;

            /// Returns true if every byte is zero
            pub fn is_null(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            /// Raw bytes in serialization order
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Builds a value from a slice of exactly the right width
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                <[u8; $len]>::try_from(bytes).ok().map(Self)
            }

            /// Reads the raw bytes
            pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
                let mut bytes = [0u8; $len];
                reader.read_exact(&mut bytes)?;
                Ok(Self(bytes))
            }

            /// Writes the raw bytes
            pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
                writer.write_all(&self.0)
            }

            /// Hex of the byte-reversed value, the way chain hashes are displayed
            pub fn to_hex(&self) -> String {
                let mut reversed = self.0;
                reversed.reverse();
                hex::encode(reversed)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;

            /// Parses display (byte-reversed) hex
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut bytes = [0u8; $len];
                hex::decode_to_slice(s, &mut bytes)?;
                bytes.reverse();
                Ok(Self(bytes))
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }
    };
}

fixed_bytes!(Uint256, 32, "32-byte opaque value (hashes, nullifiers, commitments, keys)");
fixed_bytes!(Uint160, 20, "20-byte opaque value (public key hashes)");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_byte_reversed() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        let value = Uint256(bytes);
        let shown = value.to_string();
        assert!(shown.ends_with("ab"));
        assert_eq!(shown.parse::<Uint256>().unwrap(), value);
    }

    #[test]
    fn null_detection() {
        assert!(Uint256::ZERO.is_null());
        assert!(!Uint160([1; 20]).is_null());
    }
}
