#![no_main]
use jpa_stream::{CancellationToken, ExtractOptions, NoopObserver, Unarchiver};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, archive)) = data.split_first() else {
        return;
    };
    let extension = match selector % 3 {
        0 => "jpa",
        1 => "jps",
        _ => "zip",
    };

    let dir = std::env::temp_dir().join(format!("jpa-stream-fuzz-{}", std::process::id()));
    if std::fs::create_dir_all(&dir).is_err() {
        return;
    }
    let path = dir.join(format!("input.{}", extension));
    if std::fs::write(&path, archive).is_err() {
        return;
    }

    let options = ExtractOptions::default().with_password("fuzz");
    if let Ok(mut unarchiver) = Unarchiver::open(&path, options) {
        let _ = unarchiver.test(&mut NoopObserver, &CancellationToken::new());
    }
});
