//! Windows icon container (`.ico`), one directory entry per bitmap.

use image::RgbaImage;
use std::io::{self, Cursor};

pub fn encode(bitmaps: &[RgbaImage]) -> io::Result<Vec<u8>> {
    let mut dir = ico::IconDir::new(ico::ResourceType::Icon);

    for bitmap in bitmaps {
        let image = ico::IconImage::from_rgba_data(
            bitmap.width(),
            bitmap.height(),
            bitmap.as_raw().clone(),
        );
        dir.add_entry(ico::IconDirEntry::encode(&image)?);
    }

    let mut out = vec![];
    dir.write(&mut out)?;
    Ok(out)
}

/// Edge lengths of the embedded images, in directory order.
pub fn resolutions(data: &[u8]) -> io::Result<Vec<u32>> {
    let dir = ico::IconDir::read(Cursor::new(data))?;
    Ok(dir.entries().iter().map(|e| e.width()).collect())
}
