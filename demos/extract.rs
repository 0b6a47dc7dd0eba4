//! Extract, test or list a JPA / JPS / ZIP archive set.
//!
//! Usage:
//!   cargo run --release --example extract -- backup.jpa output_dir/ [password]
//!   cargo run --release --example extract -- --test backup.jps [password]
//!   cargo run --release --example extract -- --list backup.zip

use jpa_stream::{
    CancellationToken, ExtractEvent, ExtractOptions, ExtractionProgress, ExtractionStatus,
    Unarchiver,
};

enum Mode {
    Extract(String),
    Test,
    List,
}

fn usage() -> ! {
    eprintln!("Usage: extract <archive> <output_dir> [password]");
    eprintln!("       extract --test <archive> [password]");
    eprintln!("       extract --list <archive> [password]");
    eprintln!("  extract ./site-backup.jpa ./restore/");
    std::process::exit(1);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (mode, rest) = match args.first().map(String::as_str) {
        Some("--test") => (Mode::Test, &args[1..]),
        Some("--list") => (Mode::List, &args[1..]),
        Some(_) if args.len() >= 2 => (Mode::Extract(args[1].clone()), &args[..]),
        _ => usage(),
    };
    let Some(archive) = rest.first() else {
        usage();
    };
    let password_index = if matches!(mode, Mode::Extract(_)) { 2 } else { 1 };

    let mut options = ExtractOptions::default();
    if let Some(password) = rest.get(password_index) {
        options = options.with_password(password.clone());
    }

    let mut unarchiver = Unarchiver::open(archive, options)?;
    println!(
        "{} archive, {} part(s)",
        unarchiver.format().extension().to_uppercase(),
        unarchiver.part_count()
    );

    let token = CancellationToken::new();
    let mut observer = |event: ExtractEvent| match event {
        ExtractEvent::ArchiveInformation(summary) => println!(
            "{} file(s), {:.2} MB packed, {:.2} MB unpacked",
            summary.file_count,
            summary.compressed_size as f64 / 1024.0 / 1024.0,
            summary.uncompressed_size as f64 / 1024.0 / 1024.0
        ),
        ExtractEvent::Entity(entity) => {
            println!("  {:?} {} ({} bytes)", entity.kind, entity.stored_path, entity.uncompressed_size);
        }
        ExtractEvent::Progress(_) => {}
    };

    let progress: ExtractionProgress = match mode {
        Mode::Extract(output_dir) => unarchiver.extract_to(&output_dir, &mut observer, &token)?,
        Mode::Test => unarchiver.test(&mut observer, &token),
        Mode::List => unarchiver.scan(&mut observer, &token),
    };

    match progress.status {
        ExtractionStatus::Finished => {
            println!(
                "Done: {} bytes read, {} bytes produced",
                progress.file_position, progress.running_uncompressed
            );
            Ok(())
        }
        _ => {
            if let Some(error) = progress.last_error.as_deref() {
                eprintln!("Error: {}", error);
            }
            std::process::exit(2);
        }
    }
}
