#![no_main]
use jpa_stream::crypto::{BlockDecryptor, Pbkdf2Algorithm, Pbkdf2Params};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&mode, block)) = data.split_first() else {
        return;
    };

    // Keep PBKDF2 cheap so the fuzzer spends its time on trailer handling.
    let pbkdf2 = (mode & 1 == 1).then(|| Pbkdf2Params {
        algorithm: Pbkdf2Algorithm::Sha1,
        iterations: 1,
        static_salt: mode & 2 == 2,
        salt: [mode; 64],
    });
    if let Ok(mut decryptor) = BlockDecryptor::new("fuzz", pbkdf2) {
        let _ = decryptor.decrypt(block);
    }
});
