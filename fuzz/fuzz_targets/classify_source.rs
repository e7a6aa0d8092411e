#![no_main]

use codeprof::patterns::PatternClassifier;
use codeprof::target::SourceLanguage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Classification must never panic on arbitrary source text
        if let Ok(classifier) = PatternClassifier::default_taxonomy() {
            let _ = classifier.classify_source(SourceLanguage::Python, input);
            let _ = classifier.classify_source(SourceLanguage::Shell, input);
        }
    }
});
