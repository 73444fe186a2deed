// benches/pack_throughput.rs
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use cdfs::{pack_archive, unpack_archive, verify_archive, PackOptions, UnpackOptions};
use rand::{Rng, SeedableRng};

const DIRS: usize = 16;
const FILES_PER_DIR: usize = 64;
const MAX_FILE_SIZE: usize = 256 * 1024;

struct BenchResult {
    workers: usize,
    archive_size: u64,
    pack_time: Duration,
    unpack_time: Duration,
}

fn build_dataset(root: &Path) -> io::Result<u64> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0xCDF5);
    let mut total = 0u64;
    for d in 0..DIRS {
        let dir = root.join(format!("dir{:02}", d));
        fs::create_dir_all(&dir)?;
        for f in 0..FILES_PER_DIR {
            let len = rng.gen_range(0..MAX_FILE_SIZE);
            let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            fs::write(dir.join(format!("asset{:03}.bin", f)), &data)?;
            total += len as u64;
        }
    }
    Ok(total)
}

fn mb_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    bytes as f64 / (1024.0 * 1024.0) / elapsed.as_secs_f64().max(f64::EPSILON)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- CDFS pack/unpack throughput ---");
    let workspace = tempfile::tempdir()?;
    let source = workspace.path().join("source");
    print!("Generating {} files... ", DIRS * FILES_PER_DIR);
    io::stdout().flush()?;
    let total_bytes = build_dataset(&source)?;
    println!("{:.1} MB", total_bytes as f64 / (1024.0 * 1024.0));

    let mut results = Vec::new();
    for workers in [1, 2, 4, num_cpus::get()] {
        let archive = workspace.path().join(format!("bench-{}.dat", workers));
        let out = workspace.path().join(format!("out-{}", workers));

        let start = Instant::now();
        let report = pack_archive(&source, &archive, &PackOptions::default().with_workers(workers))?;
        let pack_time = start.elapsed();
        verify_archive(&archive)?;

        let start = Instant::now();
        unpack_archive(&archive, &out, &UnpackOptions::default().with_workers(workers))?;
        let unpack_time = start.elapsed();

        fs::remove_dir_all(&out)?;
        fs::remove_file(&archive)?;
        results.push(BenchResult {
            workers,
            archive_size: report.archive_size,
            pack_time,
            unpack_time,
        });
    }

    println!();
    println!(
        "{:<8} {:<14} {:<12} {:<12} {:<12} {:<12}",
        "Workers", "Archive (B)", "Pack (s)", "Pack MB/s", "Unpack (s)", "Unpack MB/s"
    );
    println!("{}", "-".repeat(74));
    for r in &results {
        println!(
            "{:<8} {:<14} {:<12.3} {:<12.1} {:<12.3} {:<12.1}",
            r.workers,
            r.archive_size,
            r.pack_time.as_secs_f64(),
            mb_per_sec(total_bytes, r.pack_time),
            r.unpack_time.as_secs_f64(),
            mb_per_sec(total_bytes, r.unpack_time),
        );
    }
    Ok(())
}
