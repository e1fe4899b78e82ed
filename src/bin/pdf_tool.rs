//! PDF manipulation command line tool.
//!
//! Usage:
//!   pdf_tool merge <output> <input1> <input2> [more...]
//!   pdf_tool split <input> [ranges]
//!   pdf_tool extract <input> <output> <start> <end>
//!   pdf_tool delete <input> <output> <pages>
//!   pdf_tool rotate <input> <output> <angle> [pages]
//!   pdf_tool compress <input> <output> [level]
//!   pdf_tool protect <input> <output> <user-pw> [owner-pw] [--cipher NAME]
//!   pdf_tool decrypt <input> <output> <password>
//!   pdf_tool sign <input> <output> <key.der> <cert.der...> --name NAME [--reason R] [--location L]
//!   pdf_tool stamp <input> <output> <name> [reason]
//!   pdf_tool info <input> [password]
//!
//! Page numbers are 1-based. `pages` is a comma-separated list like
//! `1,3,5`; `ranges` is `1-3,4-10`. Ciphers: rc4-40, rc4-128, aes-128,
//! aes-256 (default).

use pdf_smith::editor::{
    compress, delete_pages, extract_pages, merge_documents, rotate_pages, split_document,
    stamp_signature_metadata, SplitMode,
};
use pdf_smith::encryption::{decrypt, protect, Algorithm};
use pdf_smith::signatures::{sign, SignerInfo};
use pdf_smith::Document;
use std::fs;
use std::path::Path;
use std::process;

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "merge" => cmd_merge(&args[2..]),
        "split" => cmd_split(&args[2..]),
        "extract" => cmd_extract(&args[2..]),
        "delete" => cmd_delete(&args[2..]),
        "rotate" => cmd_rotate(&args[2..]),
        "compress" => cmd_compress(&args[2..]),
        "protect" => cmd_protect(&args[2..]),
        "decrypt" => cmd_decrypt(&args[2..]),
        "sign" => cmd_sign(&args[2..]),
        "stamp" => cmd_stamp(&args[2..]),
        "info" => cmd_info(&args[2..]),
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
    eprintln!("Usage: pdf_tool <command> ...");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  merge <output> <input1> <input2> [more...]");
    eprintln!("  split <input> [ranges]             e.g. 1-3,4-10; default one file per page");
    eprintln!("  extract <input> <output> <start> <end>");
    eprintln!("  delete <input> <output> <pages>    e.g. 2,5");
    eprintln!("  rotate <input> <output> <angle> [pages]");
    eprintln!("  compress <input> <output> [level 1-9]");
    eprintln!("  protect <input> <output> <user-pw> [owner-pw] [--cipher aes-256]");
    eprintln!("  decrypt <input> <output> <password>");
    eprintln!("  sign <input> <output> <key.der> <cert.der...> --name NAME [--reason R] [--location L]");
    eprintln!("  stamp <input> <output> <name> [reason]");
    eprintln!("  info <input> [password]");
}

fn cmd_merge(args: &[String]) -> Result<(), String> {
    if args.len() < 3 {
        return Err("merge needs an output and at least two inputs".to_string());
    }
    let output = &args[0];
    let mut docs = args[1..]
        .iter()
        .map(|p| open(p))
        .collect::<Result<Vec<_>, _>>()?;

    let merged = merge_documents(&mut docs).map_err(|e| e.to_string())?;
    write_doc(output, &merged)?;
    println!("Merged {} files into {}", docs.len(), output);
    Ok(())
}

fn cmd_split(args: &[String]) -> Result<(), String> {
    let (input, ranges) = match args {
        [input] => (input, None),
        [input, ranges] => (input, Some(ranges)),
        _ => return Err("split takes an input and an optional range list".to_string()),
    };
    let mut doc = open(input)?;

    let mode = match ranges {
        Some(spec) => SplitMode::Ranges(parse_ranges(spec)?),
        None => SplitMode::Individual,
    };
    let parts = split_document(&mut doc, &mode).map_err(|e| e.to_string())?;

    let stem = Path::new(input)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "part".to_string());
    for (i, part) in parts.iter().enumerate() {
        let path = format!("{}_part_{}.pdf", stem, i + 1);
        write_doc(&path, part)?;
        println!("Wrote {}", path);
    }
    Ok(())
}

fn cmd_extract(args: &[String]) -> Result<(), String> {
    let [input, output, start, end] = args else {
        return Err("extract takes <input> <output> <start> <end>".to_string());
    };
    let start: usize = start.parse().map_err(|_| format!("bad page number {:?}", start))?;
    let end: usize = end.parse().map_err(|_| format!("bad page number {:?}", end))?;

    let mut doc = open(input)?;
    let extracted = extract_pages(&mut doc, start, end).map_err(|e| e.to_string())?;
    write_doc(output, &extracted)
}

fn cmd_delete(args: &[String]) -> Result<(), String> {
    let [input, output, pages] = args else {
        return Err("delete takes <input> <output> <pages>".to_string());
    };
    let pages = parse_page_list(pages)?;

    let mut doc = open(input)?;
    let remaining = delete_pages(&mut doc, &pages).map_err(|e| e.to_string())?;
    write_doc(output, &remaining)
}

fn cmd_rotate(args: &[String]) -> Result<(), String> {
    let (input, output, angle, pages) = match args {
        [input, output, angle] => (input, output, angle, None),
        [input, output, angle, pages] => (input, output, angle, Some(parse_page_list(pages)?)),
        _ => return Err("rotate takes <input> <output> <angle> [pages]".to_string()),
    };
    let angle: i64 = angle.parse().map_err(|_| format!("bad angle {:?}", angle))?;

    let mut doc = open(input)?;
    let rotated =
        rotate_pages(&mut doc, angle, pages.as_deref()).map_err(|e| e.to_string())?;
    write_doc(output, &rotated)
}

fn cmd_compress(args: &[String]) -> Result<(), String> {
    let (input, output, level) = match args {
        [input, output] => (input, output, 6),
        [input, output, level] => (
            input,
            output,
            level.parse().map_err(|_| format!("bad level {:?}", level))?,
        ),
        _ => return Err("compress takes <input> <output> [level]".to_string()),
    };

    let mut doc = open(input)?;
    let before = doc.raw_bytes().len();
    let compressed = compress(&mut doc, level).map_err(|e| e.to_string())?;
    write_doc(output, &compressed)?;
    println!("{} bytes -> {} bytes", before, compressed.raw_bytes().len());
    Ok(())
}

fn cmd_protect(args: &[String]) -> Result<(), String> {
    let mut positional: Vec<&String> = Vec::new();
    let mut cipher = Algorithm::Aes256;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--cipher" => {
                i += 1;
                cipher = match args.get(i).map(|s| s.as_str()) {
                    Some("rc4-40") => Algorithm::Rc4_40,
                    Some("rc4-128") => Algorithm::Rc4_128,
                    Some("aes-128") => Algorithm::Aes128,
                    Some("aes-256") => Algorithm::Aes256,
                    other => return Err(format!("unknown cipher {:?}", other.unwrap_or(""))),
                };
            },
            _ => positional.push(&args[i]),
        }
        i += 1;
    }

    let (input, output, user_pw, owner_pw) = match positional.as_slice() {
        [input, output, user] => (input, output, user, None),
        [input, output, user, owner] => (input, output, user, Some(owner.as_bytes())),
        _ => return Err("protect takes <input> <output> <user-pw> [owner-pw]".to_string()),
    };

    let mut doc = open(input)?;
    let locked =
        protect(&mut doc, cipher, user_pw.as_bytes(), owner_pw).map_err(|e| e.to_string())?;
    write_doc(output, &locked)
}

fn cmd_decrypt(args: &[String]) -> Result<(), String> {
    let [input, output, password] = args else {
        return Err("decrypt takes <input> <output> <password>".to_string());
    };
    let mut doc = open(input)?;
    let plain = decrypt(&mut doc, password.as_bytes()).map_err(|e| e.to_string())?;
    write_doc(output, &plain)
}

fn cmd_sign(args: &[String]) -> Result<(), String> {
    let mut positional: Vec<&String> = Vec::new();
    let mut name = None;
    let mut reason = None;
    let mut location = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--name" => {
                i += 1;
                name = args.get(i).cloned();
            },
            "--reason" => {
                i += 1;
                reason = args.get(i).cloned();
            },
            "--location" => {
                i += 1;
                location = args.get(i).cloned();
            },
            _ => positional.push(&args[i]),
        }
        i += 1;
    }

    if positional.len() < 4 {
        return Err("sign takes <input> <output> <key.der> <cert.der...>".to_string());
    }
    let (input, output, key_path) = (positional[0], positional[1], positional[2]);
    let name = name.ok_or_else(|| "sign requires --name".to_string())?;

    let key = fs::read(key_path).map_err(|e| format!("cannot read {}: {}", key_path, e))?;
    let certs = positional[3..]
        .iter()
        .map(|p| fs::read(p).map_err(|e| format!("cannot read {}: {}", p, e)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut signer = SignerInfo::new(name);
    if let Some(reason) = reason {
        signer = signer.reason(reason);
    }
    if let Some(location) = location {
        signer = signer.location(location);
    }

    let mut doc = open(input)?;
    let signed = sign(&mut doc, &signer, &key, &certs).map_err(|e| e.to_string())?;
    fs::write(output, signed).map_err(|e| format!("cannot write {}: {}", output, e))?;
    println!("Signed {} -> {}", input, output);
    Ok(())
}

fn cmd_stamp(args: &[String]) -> Result<(), String> {
    let (input, output, name, reason) = match args {
        [input, output, name] => (input, output, name, None),
        [input, output, name, reason] => (input, output, name, Some(reason)),
        _ => return Err("stamp takes <input> <output> <name> [reason]".to_string()),
    };

    let mut signer = SignerInfo::new(name.as_str());
    if let Some(reason) = reason {
        signer = signer.reason(reason.as_str());
    }

    let mut doc = open(input)?;
    let stamped = stamp_signature_metadata(&mut doc, &signer).map_err(|e| e.to_string())?;
    write_doc(output, &stamped)
}

fn cmd_info(args: &[String]) -> Result<(), String> {
    let (input, password) = match args {
        [input] => (input, None),
        [input, password] => (input, Some(password)),
        _ => return Err("info takes <input> [password]".to_string()),
    };

    let mut doc = open(input)?;
    let (major, minor) = doc.version();
    println!("File:      {}", input);
    println!("Version:   PDF {}.{}", major, minor);
    println!("Size:      {} bytes", doc.raw_bytes().len());
    println!("Encrypted: {}", if doc.is_encrypted() { "yes" } else { "no" });

    if doc.needs_password() {
        let Some(password) = password else {
            return Err("document is password protected; pass the password".to_string());
        };
        if !doc.authenticate(password.as_bytes()).map_err(|e| e.to_string())? {
            return Err("incorrect password".to_string());
        }
    }
    println!("Pages:     {}", doc.page_count().map_err(|e| e.to_string())?);
    Ok(())
}

fn open(path: &str) -> Result<Document, String> {
    if !Path::new(path).exists() {
        return Err(format!("{} does not exist", path));
    }
    Document::open(path).map_err(|e| format!("cannot open {}: {}", path, e))
}

fn write_doc(path: &str, doc: &Document) -> Result<(), String> {
    fs::write(path, doc.raw_bytes()).map_err(|e| format!("cannot write {}: {}", path, e))
}

/// `2,5,7` into a 1-based page list.
fn parse_page_list(spec: &str) -> Result<Vec<usize>, String> {
    spec.split(',')
        .map(|tok| {
            tok.trim()
                .parse::<usize>()
                .map_err(|_| format!("bad page number {:?}", tok))
        })
        .collect()
}

/// `1-3,4-10` into 1-based inclusive ranges; a bare `5` means `5-5`.
fn parse_ranges(spec: &str) -> Result<Vec<(usize, usize)>, String> {
    spec.split(',')
        .map(|tok| {
            let tok = tok.trim();
            let (start, end) = match tok.split_once('-') {
                Some((a, b)) => (a, b),
                None => (tok, tok),
            };
            let start = start
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("bad range {:?}", tok))?;
            let end = end
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("bad range {:?}", tok))?;
            Ok((start, end))
        })
        .collect()
}
