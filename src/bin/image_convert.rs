//! Image conversion command line tool.
//!
//! Usage:
//!   image_convert jpg-png photo.jpg
//!   image_convert png-jpg logo.png
//!   image_convert webp-jpg picture.webp
//!   image_convert webp-png picture.webp
//!   image_convert img-pdf scan1.jpg scan2.png -o album.pdf
//!
//! Single-image commands write the result next to the input with the
//! target extension. `img-pdf` writes `output.pdf` unless `-o` names a
//! different path.

use pdf_smith::images::{self, ImageFormat};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "jpg-png" => convert_one(&args[2..], ImageFormat::Jpeg, ImageFormat::Png),
        "png-jpg" => convert_one(&args[2..], ImageFormat::Png, ImageFormat::Jpeg),
        "webp-jpg" => convert_one(&args[2..], ImageFormat::WebP, ImageFormat::Jpeg),
        "webp-png" => convert_one(&args[2..], ImageFormat::WebP, ImageFormat::Png),
        "img-pdf" => images_to_pdf(&args[2..]),
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            process::exit(1);
        },
    };

    if let Err(message) = result {
        eprintln!("Error: {}", message);
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Usage: image_convert <command> <input...>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  jpg-png <file>            Convert a JPEG to PNG");
    eprintln!("  png-jpg <file>            Convert a PNG to JPEG");
    eprintln!("  webp-jpg <file>           Convert a WebP to JPEG");
    eprintln!("  webp-png <file>           Convert a WebP to PNG");
    eprintln!("  img-pdf <files...> [-o out.pdf]   Combine images into a PDF");
}

fn convert_one(args: &[String], source: ImageFormat, target: ImageFormat) -> Result<(), String> {
    let [input] = args else {
        return Err("expected exactly one input file".to_string());
    };
    let data = read_image(Path::new(input), source)?;

    let converted = images::convert(&data, source, target).map_err(|e| e.to_string())?;
    let output = Path::new(input).with_extension(target.extension());
    fs::write(&output, converted).map_err(|e| format!("cannot write {}: {}", output.display(), e))?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn images_to_pdf(args: &[String]) -> Result<(), String> {
    let mut inputs: Vec<PathBuf> = Vec::new();
    let mut output = PathBuf::from("output.pdf");

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-o" | "--output" => {
                i += 1;
                output = PathBuf::from(
                    args.get(i).ok_or_else(|| "-o requires a path".to_string())?,
                );
            },
            other => inputs.push(PathBuf::from(other)),
        }
        i += 1;
    }
    if inputs.is_empty() {
        return Err("expected at least one input image".to_string());
    }

    let mut images = Vec::with_capacity(inputs.len());
    for path in &inputs {
        if !path.exists() {
            return Err(format!("{} does not exist", path.display()));
        }
        let data =
            fs::read(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        if ImageFormat::detect(&data).is_none() {
            return Err(format!("{} is not a recognized image", path.display()));
        }
        images.push(data);
    }

    let pdf = images::images_to_pdf(&images).map_err(|e| e.to_string())?;
    fs::write(&output, pdf).map_err(|e| format!("cannot write {}: {}", output.display(), e))?;
    println!("Wrote {} ({} pages)", output.display(), inputs.len());
    Ok(())
}

/// Read one input and check its magic number against the command.
fn read_image(path: &Path, expected: ImageFormat) -> Result<Vec<u8>, String> {
    if !path.exists() {
        return Err(format!("{} does not exist", path.display()));
    }
    let data = fs::read(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    match ImageFormat::detect(&data) {
        Some(found) if found == expected => Ok(data),
        Some(found) => Err(format!(
            "{} contains {} data, expected {}",
            path.display(),
            found,
            expected
        )),
        None => Err(format!("{} is not a recognized image", path.display())),
    }
}
