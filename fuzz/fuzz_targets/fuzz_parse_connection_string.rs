#![no_main]

use libfuzzer_sys::arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use xproto_connect::{ConnectionDescriptor, ParsedOptions};

/// Key/value pairs assembled from fuzzer input so the parser sees
/// plausible structure more often than raw bytes would produce.
#[derive(Debug)]
struct Pairs(Vec<(String, String)>);

impl<'a> Arbitrary<'a> for Pairs {
    fn arbitrary(u: &mut Unstructured<'a>) -> libfuzzer_sys::arbitrary::Result<Self> {
        const KEYS: &[&str] = &[
            "server", "port", "user", "password", "database", "ssl-mode", "ssl-ca",
            "auth", "tls-version", "connect-timeout", "dns-srv", "pooling",
        ];
        let len = u.int_in_range(0..=8)?;
        let mut pairs = Vec::with_capacity(len);
        for _ in 0..len {
            let key = if u.arbitrary()? {
                u.choose(KEYS)?.to_string()
            } else {
                u.arbitrary()?
            };
            pairs.push((key, u.arbitrary()?));
        }
        Ok(Self(pairs))
    }
}

fuzz_target!(|input: Pairs| {
    let text = input
        .0
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(";");

    let _ = ParsedOptions::parse(&text);
    if let Ok(descriptor) = ConnectionDescriptor::parse(&text) {
        let canonical = ConnectionDescriptor::parse(&descriptor.to_connection_string())
            .expect("canonical connection string must parse");
        let _ = canonical.to_uri();
    }
});
