use std::io::Cursor;

use image::{GrayImage, Luma};
use thiserror::Error;

/// Code 128 element widths, indexed by symbol value 0..=106. Each entry is
/// six alternating bar/space widths summing to eleven modules; the stop
/// symbol (106) carries its two-module termination bar for thirteen.
const PATTERNS: [&str; 107] = [
    "212222", "222122", "222221", "121223", "121322", "131222", "122213", "122312", "132212",
    "221213", "221312", "231212", "112232", "122132", "122231", "113222", "123122", "123221",
    "223211", "221132", "221231", "213212", "223112", "312131", "311222", "321122", "321221",
    "312212", "322112", "322211", "212123", "212321", "232121", "111323", "131123", "131321",
    "112313", "132113", "132311", "211313", "231113", "231311", "112133", "112331", "132131",
    "113123", "113321", "133121", "313121", "211331", "231131", "213113", "213311", "213131",
    "311123", "311321", "331121", "312113", "312311", "332111", "314111", "221411", "431111",
    "111224", "111422", "121124", "121421", "141122", "141221", "112214", "112412", "122114",
    "122411", "142112", "142211", "241211", "221114", "413111", "241112", "134111", "111242",
    "121142", "121241", "114212", "124112", "124211", "411212", "421112", "421211", "212141",
    "214121", "412121", "111143", "111341", "131141", "114113", "114311", "411113", "411311",
    "113141", "114131", "311141", "411131", "211412", "211214", "211232", "2331112",
];

const START_B: u8 = 104;
const START_C: u8 = 105;
const CODE_B: u8 = 100;
const CODE_C: u8 = 99;
const STOP: u8 = 106;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BarcodeError {
    #[error("payload is empty")]
    Empty,

    #[error("payload contains a character outside the Code 128 B set: {0:?}")]
    UnsupportedCharacter(char),
}

/// Encode `payload` into Code 128 symbol values (start code through
/// checksum, stop excluded). Digit runs of four or more compress into
/// code set C; everything else uses set B.
pub fn codewords(payload: &str) -> Result<Vec<u8>, BarcodeError> {
    if payload.is_empty() {
        return Err(BarcodeError::Empty);
    }
    for ch in payload.chars() {
        if !(' '..='~').contains(&ch) {
            return Err(BarcodeError::UnsupportedCharacter(ch));
        }
    }

    let bytes = payload.as_bytes();
    let mut words: Vec<u8> = Vec::new();
    let mut index = 0;
    let mut in_code_c = false;

    while index < bytes.len() {
        let digits = bytes[index..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        let compressible = digits - (digits % 2);

        if compressible >= 4 {
            if words.is_empty() {
                words.push(START_C);
            } else if !in_code_c {
                words.push(CODE_C);
            }
            in_code_c = true;
            for _ in 0..compressible / 2 {
                let pair = (bytes[index] - b'0') * 10 + (bytes[index + 1] - b'0');
                words.push(pair);
                index += 2;
            }
        } else {
            if words.is_empty() {
                words.push(START_B);
            } else if in_code_c {
                words.push(CODE_B);
            }
            in_code_c = false;
            words.push(bytes[index] - 32);
            index += 1;
        }
    }

    let checksum = words
        .iter()
        .enumerate()
        .fold(0u32, |sum, (position, value)| {
            sum + *value as u32 * (position as u32).max(1)
        })
        % 103;
    words.push(checksum as u8);
    Ok(words)
}

/// Full module-width sequence (bars and spaces alternating, bar first),
/// including the stop symbol.
pub fn modules(payload: &str) -> Result<Vec<u8>, BarcodeError> {
    let mut words = codewords(payload)?;
    words.push(STOP);
    let mut widths = Vec::with_capacity(words.len() * 6 + 1);
    for word in words {
        for width in PATTERNS[word as usize].bytes() {
            widths.push(width - b'0');
        }
    }
    Ok(widths)
}

/// Rasterize the barcode to a PNG with a ten-module quiet zone.
pub fn png(payload: &str, module_width: u32, height: u32) -> Result<Vec<u8>, BarcodeError> {
    let widths = modules(payload)?;
    let total_modules: u32 = widths.iter().map(|w| *w as u32).sum::<u32>() + 20;
    let image_width = total_modules * module_width;

    let mut image = GrayImage::from_pixel(image_width, height, Luma([255u8]));
    let mut x = 10 * module_width;
    for (index, width) in widths.iter().enumerate() {
        let span = *width as u32 * module_width;
        if index % 2 == 0 {
            for dx in 0..span {
                for y in 0..height {
                    image.put_pixel(x + dx, y, Luma([0u8]));
                }
            }
        }
        x += span;
    }

    let mut out = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .expect("in-memory PNG encoding cannot fail");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_payloads() {
        assert_eq!(codewords(""), Err(BarcodeError::Empty));
        assert_eq!(
            codewords("中文"),
            Err(BarcodeError::UnsupportedCharacter('中'))
        );
    }

    #[test]
    fn uses_code_c_for_digit_runs() {
        let words = codewords("2026").unwrap();
        assert_eq!(words[0], START_C);
        assert_eq!(&words[1..3], &[20, 26]);
    }

    #[test]
    fn mixed_payload_switches_sets() {
        let words = codewords("AB|2026").unwrap();
        assert_eq!(words[0], START_B);
        assert!(words.contains(&CODE_C));
    }

    #[test]
    fn checksum_matches_manual_computation() {
        // "AB" in set B: start 104, values 33, 34.
        let words = codewords("AB").unwrap();
        assert_eq!(words[0], 104);
        assert_eq!(words[1], 33);
        assert_eq!(words[2], 34);
        let expected = (104 + 33 + 34 * 2) % 103;
        assert_eq!(words[3] as u32, expected);
    }

    #[test]
    fn module_count_is_11n_plus_13() {
        let widths = modules("67e55044|EI|2026|03").unwrap();
        let symbols = codewords("67e55044|EI|2026|03").unwrap().len();
        let total: u32 = widths.iter().map(|w| *w as u32).sum();
        assert_eq!(total, 11 * symbols as u32 + 13);
    }

    #[test]
    fn png_has_magic_and_quiet_zone() {
        let bytes = png("X|1|2026|03", 2, 40).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
