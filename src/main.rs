//! REMNANT - Remote Document Store
//! Interactive shell over a persistent remote document cache.

use std::io::{self, BufRead, Write};

use remnant::config::Config;
use remnant::document::Document;
use remnant::error::{RemnantError, Result};
use remnant::store::{DocumentMap, Query, RemoteDocumentStore};
use remnant::types::{DocumentKey, FieldValue, ObjectValue, ReadTime};

fn main() {
    env_logger::init();

    println!();
    println!("  ╔═══════════════════════════════════════════╗");
    println!("  ║          REMNANT Document Store           ║");
    println!("  ║     Versioned Remote Document Cache       ║");
    println!("  ╚═══════════════════════════════════════════╝");
    println!();
    println!("  Commands:");
    println!("    add <path> <secs> [nanos] [field=value ...]  - Cache a found document");
    println!("    tomb <path> <secs> [nanos]                   - Cache a deletion");
    println!("    get <path>                                   - Look up one document");
    println!("    getall <path> [path ...]                     - Batched lookup");
    println!("    del <path>                                   - Drop a cached document");
    println!("    query <collection> [secs [nanos]]            - Scan a collection");
    println!("    latest                                       - Latest read time");
    println!("    stats                                        - Show store metrics");
    println!("    exit                                         - Shutdown");
    println!();

    let config = Config::default();
    let store = match RemoteDocumentStore::open(config) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("[ERROR] Failed to open store: {}", err);
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("remnant> ");
        if stdout.flush().is_err() {
            break;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break, // EOF
            Ok(_) => {}
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        let command = parts[0].to_lowercase();
        if matches!(command.as_str(), "exit" | "quit" | "q") {
            println!("  Shutting down REMNANT...");
            break;
        }
        if let Err(e) = run_command(&store, &command, &parts[1..]) {
            println!("  ERROR: {}", e);
        }
    }
}

fn run_command(store: &RemoteDocumentStore, command: &str, args: &[&str]) -> Result<()> {
    match command {
        "add" | "set" => {
            let [path, secs, rest @ ..] = args else {
                return usage("add <path> <secs> [nanos] [field=value ...]");
            };
            let (read_time, fields) = parse_read_time(secs, rest)?;
            let mut data = ObjectValue::new();
            for field in fields {
                let (name, value) = field.split_once('=').ok_or_else(|| {
                    RemnantError::InvalidArgument(format!("expected field=value, got '{}'", field))
                })?;
                data.insert(name.to_string(), parse_value(value));
            }
            let document = Document::found(path.parse()?, read_time, data);
            store.add(&document, read_time)?;
            println!("  OK");
        }
        "tomb" => {
            let [path, secs, rest @ ..] = args else {
                return usage("tomb <path> <secs> [nanos]");
            };
            let (read_time, _) = parse_read_time(secs, rest)?;
            store.add(&Document::deleted(path.parse()?, read_time), read_time)?;
            println!("  OK (tombstone)");
        }
        "get" => {
            let [path] = args else {
                return usage("get <path>");
            };
            print_document(&store.get(&path.parse()?)?);
        }
        "getall" => {
            if args.is_empty() {
                return usage("getall <path> [path ...]");
            }
            let keys = args
                .iter()
                .map(|p| p.parse())
                .collect::<Result<Vec<DocumentKey>>>()?;
            print_map(&store.get_all(&keys)?);
        }
        "del" | "delete" => {
            let [path] = args else {
                return usage("del <path>");
            };
            store.remove(&path.parse()?)?;
            println!("  OK (removed)");
        }
        "query" | "scan" => {
            let Some((collection, rest)) = args.split_first() else {
                return usage("query <collection> [secs [nanos]]");
            };
            let since = match rest {
                [] => ReadTime::NONE,
                [secs, more @ ..] => parse_read_time(secs, more)?.0,
            };
            let query = Query::collection(collection.parse()?)?;
            print_map(&store.get_all_matching_query(&query, since)?);
        }
        "latest" => {
            println!("  {}", store.get_latest_read_time()?);
        }
        "info" | "stats" => {
            println!("{}", store.metrics().report());
        }
        other => {
            println!("  Unknown command: '{}'. Type 'exit' to quit.", other);
        }
    }
    Ok(())
}

fn usage(text: &str) -> Result<()> {
    println!("  Usage: {}", text);
    Ok(())
}

/// Parse `<secs> [nanos]`, returning whatever arguments follow.
fn parse_read_time<'a>(secs: &str, rest: &'a [&'a str]) -> Result<(ReadTime, &'a [&'a str])> {
    let seconds = secs
        .parse::<i64>()
        .map_err(|_| RemnantError::InvalidArgument(format!("bad seconds '{}'", secs)))?;
    match rest.split_first() {
        Some((nanos, tail)) if !nanos.contains('=') => {
            let nanos = nanos
                .parse::<i32>()
                .map_err(|_| RemnantError::InvalidArgument(format!("bad nanos '{}'", nanos)))?;
            Ok((ReadTime::new(seconds, nanos)?, tail))
        }
        _ => Ok((ReadTime::new(seconds, 0)?, rest)),
    }
}

fn parse_value(raw: &str) -> FieldValue {
    match raw {
        "null" => FieldValue::Null,
        "true" => FieldValue::Boolean(true),
        "false" => FieldValue::Boolean(false),
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                FieldValue::Integer(i)
            } else if let Ok(f) = raw.parse::<f64>() {
                FieldValue::Double(f)
            } else {
                FieldValue::String(raw.to_string())
            }
        }
    }
}

fn print_document(document: &Document) {
    match document {
        Document::Found {
            key,
            data,
            read_time,
            ..
        } => {
            println!("  {} (read {})", key, read_time);
            for (name, value) in data {
                println!("    {} = {:?}", name, value);
            }
        }
        Document::Deleted { key, read_time, .. } => {
            println!("  {} <deleted> (read {})", key, read_time);
        }
        Document::Invalid { key } => println!("  {} (nil)", key),
    }
}

fn print_map(documents: &DocumentMap) {
    if documents.is_empty() {
        println!("  (empty)");
        return;
    }
    for document in documents.values() {
        print_document(document);
    }
    println!("  ({} documents)", documents.len());
}
