//! Apple icon container (`.icns`).
//!
//! Layout: the `icns` magic, a big-endian u32 file length, then one element
//! per slot made of a four-byte OSType, a big-endian u32 element length
//! (header included) and the PNG payload.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read};

const MAGIC: &[u8; 4] = b"icns";
const HEADER_LEN: u32 = 8;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct AppleSlot {
    pub ostype: [u8; 4],
    pub name: &'static str,
    /// Edge length of the bitmap this slot is filled from.
    pub source: u32,
}

/// The "@2x" slots reuse lower-resolution bitmaps; `icon_256x256@2x` is
/// filled from the 256px bitmap rather than dedicated 512px art. The 48px
/// bitmap has no slot.
pub const APPLE_SLOTS: [AppleSlot; 8] = [
    AppleSlot { ostype: *b"icp4", name: "icon_16x16", source: 16 },
    AppleSlot { ostype: *b"ic11", name: "icon_16x16@2x", source: 32 },
    AppleSlot { ostype: *b"icp5", name: "icon_32x32", source: 32 },
    AppleSlot { ostype: *b"ic12", name: "icon_32x32@2x", source: 64 },
    AppleSlot { ostype: *b"ic07", name: "icon_128x128", source: 128 },
    AppleSlot { ostype: *b"ic13", name: "icon_128x128@2x", source: 256 },
    AppleSlot { ostype: *b"ic08", name: "icon_256x256", source: 256 },
    AppleSlot { ostype: *b"ic14", name: "icon_256x256@2x", source: 256 },
];

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IcnsElement {
    pub ostype: [u8; 4],
    pub data: Vec<u8>,
}

impl IcnsElement {
    pub fn ostype_str(&self) -> String {
        String::from_utf8_lossy(&self.ostype).into_owned()
    }
}

pub fn encode(elements: &[IcnsElement]) -> io::Result<Vec<u8>> {
    let mut total = HEADER_LEN as usize;
    for element in elements {
        total += HEADER_LEN as usize + element.data.len();
    }

    let total = u32::try_from(total)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "icns larger than 4GiB"))?;

    let mut out = Vec::with_capacity(total as usize);
    out.extend_from_slice(MAGIC);
    out.write_u32::<BigEndian>(total)?;

    for element in elements {
        out.extend_from_slice(&element.ostype);
        out.write_u32::<BigEndian>(HEADER_LEN + element.data.len() as u32)?;
        out.extend_from_slice(&element.data);
    }

    Ok(out)
}

pub fn decode(data: &[u8]) -> io::Result<Vec<IcnsElement>> {
    let invalid = |msg: &str| io::Error::new(io::ErrorKind::InvalidData, msg.to_string());

    let mut cursor = Cursor::new(data);
    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(invalid("not an icns file"));
    }

    let total = cursor.read_u32::<BigEndian>()? as usize;
    if total != data.len() {
        return Err(invalid("icns length does not match file size"));
    }

    let mut elements = vec![];
    while (cursor.position() as usize) < total {
        let mut ostype = [0u8; 4];
        cursor.read_exact(&mut ostype)?;
        let len = cursor.read_u32::<BigEndian>()?;
        if len < HEADER_LEN {
            return Err(invalid("icns element shorter than its header"));
        }

        let mut payload = vec![0u8; (len - HEADER_LEN) as usize];
        cursor.read_exact(&mut payload)?;
        elements.push(IcnsElement {
            ostype,
            data: payload,
        });
    }

    Ok(elements)
}
