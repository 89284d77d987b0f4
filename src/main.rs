//! RANGEINGEST - Interactive Shell
//! Drives a single in-memory replica: write committed data, ingest sorted
//! tables into it, and inspect the resulting range statistics.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};

use rangeingest::config::Config;
use rangeingest::engine::sstable::{SortedTable, SortedTableWriter};
use rangeingest::engine::Replica;
use rangeingest::error::{IngestError, Result};
use rangeingest::eval::projection::{ColumnarProjector, NamespaceId};
use rangeingest::eval::{AddSstRequest, Header};
use rangeingest::types::{KeyRange, PrettyKey, Timestamp, VersionedKey};

fn now_nanos() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

fn parse_wall(s: &str) -> Result<i64> {
    s.parse()
        .map_err(|_| IngestError::Config(format!("invalid timestamp '{}'", s)))
}

fn versioned(key: &str, wall: i64) -> VersionedKey {
    VersionedKey::new(key.as_bytes().to_vec(), Timestamp::new(wall, 0))
}

fn span_arg(start: &str, end: &str) -> KeyRange {
    KeyRange::new(start.as_bytes().to_vec(), end.as_bytes().to_vec())
}

/// Parses `key@wall=value` (an empty value writes a tombstone).
fn parse_entry(s: &str) -> Result<(VersionedKey, Vec<u8>)> {
    let (versioned_arg, value) = s
        .split_once('=')
        .ok_or_else(|| IngestError::Config(format!("expected key@wall=value, got '{}'", s)))?;
    let (key, wall) = versioned_arg
        .rsplit_once('@')
        .ok_or_else(|| IngestError::Config(format!("missing @wall in '{}'", versioned_arg)))?;
    Ok((versioned(key, parse_wall(wall)?), value.as_bytes().to_vec()))
}

fn build_table(args: &[&str]) -> Result<SortedTable> {
    let mut sorted = BTreeMap::new();
    for arg in args {
        let (key, value) = parse_entry(arg)?;
        sorted.insert(key, value);
    }
    let mut writer = SortedTableWriter::new();
    for (key, value) in sorted {
        writer.add(key, &value)?;
    }
    Ok(writer.finish())
}

fn ingest(
    replica: &mut Replica,
    projector: &ColumnarProjector,
    span: KeyRange,
    table: SortedTable,
    disallow_shadowing: bool,
) -> Result<()> {
    let mut req = AddSstRequest::new(span, table);
    req.disallow_shadowing = disallow_shadowing;
    let header = Header::at(Timestamp::new(now_nanos(), 0));
    let result = replica.evaluate(&header, &req, projector)?;
    let applied = replica.apply(&result.replicated)?;
    println!(
        "  OK ({} entries, crc32 {:#010x}, {} duplicates skipped)",
        applied, result.replicated.add_sstable.crc32, result.skipped_duplicates
    );
    println!(
        "  delta: keys {:+} live {:+}B garbage {:+}B estimated={}",
        result.delta.key_count,
        result.delta.live_bytes,
        result.delta.garbage_bytes,
        result.delta.contains_estimates
    );
    Ok(())
}

fn main() {
    env_logger::init();

    println!();
    println!("  ╔═══════════════════════════════════════════╗");
    println!("  ║        RANGEINGEST Evaluation Shell       ║");
    println!("  ║    Sorted-Table Ingestion for one Range   ║");
    println!("  ╚═══════════════════════════════════════════╝");
    println!();
    println!("  Commands:");
    println!("    put <key> <wall> <value>              - Write a committed version");
    println!("    del <key> <wall>                      - Write a committed tombstone");
    println!("    ingest <start> <end> [noshadow] <key@wall=value>...");
    println!("                                          - Evaluate and apply a sorted table");
    println!("    load <start> <end> <file> [noshadow]  - Ingest a table file from the data dir");
    println!("    scan                                  - List committed entries");
    println!("    stats                                 - Show range statistics");
    println!("    recompute                             - Recompute exact statistics");
    println!("    metrics                               - Show evaluation metrics");
    println!("    exit                                  - Quit");
    println!();

    let data_dir = std::env::args().nth(1).unwrap_or_else(|| "./data".to_string());
    let config = Config::new(data_dir);
    if let Err(e) = config.ensure_dirs() {
        eprintln!("[FATAL] cannot create data dir {}: {}", config.data_dir.display(), e);
        std::process::exit(1);
    }
    let projector = ColumnarProjector::new(NamespaceId(config.projection_namespace));
    let data_dir = config.data_dir.clone();
    let mut replica = Replica::new(KeyRange::new(Vec::new(), vec![0xff]), config);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("rangeingest> ");
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

        let outcome = match parts[0].to_lowercase().as_str() {
            "put" | "set" => {
                if parts.len() < 4 {
                    println!("  Usage: put <key> <wall> <value>");
                    continue;
                }
                parse_wall(parts[2]).and_then(|wall| {
                    let key = versioned(parts[1], wall);
                    replica.put(key, parts[3..].join(" ").into_bytes(), now_nanos())
                })
            }
            "del" | "delete" => {
                if parts.len() < 3 {
                    println!("  Usage: del <key> <wall>");
                    continue;
                }
                parse_wall(parts[2]).and_then(|wall| {
                    let key = versioned(parts[1], wall);
                    replica.put(key, Vec::new(), now_nanos())
                })
            }
            "ingest" => {
                if parts.len() < 4 {
                    println!("  Usage: ingest <start> <end> [noshadow] <key@wall=value>...");
                    continue;
                }
                let span = span_arg(parts[1], parts[2]);
                let noshadow = parts[3] == "noshadow";
                let entries = if noshadow { &parts[4..] } else { &parts[3..] };
                build_table(entries)
                    .and_then(|table| ingest(&mut replica, &projector, span, table, noshadow))
            }
            "load" => {
                if parts.len() < 4 {
                    println!("  Usage: load <start> <end> <file> [noshadow]");
                    continue;
                }
                let span = span_arg(parts[1], parts[2]);
                let noshadow = parts.get(4) == Some(&"noshadow");
                SortedTable::from_file(data_dir.join(parts[3]))
                    .and_then(|table| ingest(&mut replica, &projector, span, table, noshadow))
            }
            "scan" | "list" => {
                let entries = replica.data().scan();
                if entries.is_empty() {
                    println!("  (empty)");
                } else {
                    for (key, value) in &entries {
                        if value.is_empty() {
                            println!("  {} -> <tombstone>", key);
                        } else {
                            println!("  {} -> {}", key, PrettyKey(value));
                        }
                    }
                    println!("  ({} entries)", entries.len());
                }
                Ok(())
            }
            "stats" | "info" => {
                let s = replica.stats();
                println!("  Span:        {}", replica.span());
                println!("  Keys:        {} ({} bytes)", s.key_count, s.key_bytes);
                println!("  Values:      {} ({} bytes)", s.val_count, s.val_bytes);
                println!("  Live:        {} ({} bytes)", s.live_count, s.live_bytes);
                println!("  Garbage:     {} ({} bytes)", s.garbage_count, s.garbage_bytes);
                println!("  Estimated:   {}", s.contains_estimates);
                Ok(())
            }
            "recompute" => replica.recompute_stats(now_nanos()).map(|correction| {
                println!(
                    "  OK (corrected keys {:+}, live {:+}B)",
                    correction.key_count, correction.live_bytes
                );
            }),
            "metrics" => {
                println!("{}", replica.metrics().report());
                Ok(())
            }
            "exit" | "quit" | "q" => {
                println!("  Shutting down RANGEINGEST...");
                break;
            }
            _ => {
                println!("  Unknown command: '{}'. Type 'exit' to quit.", parts[0]);
                continue;
            }
        };

        if let Err(e) = outcome {
            println!("  ERROR: {}", e);
            if e.is_fatal() {
                eprintln!("[FATAL] {}", e);
                std::process::exit(1);
            }
        }
    }
}
