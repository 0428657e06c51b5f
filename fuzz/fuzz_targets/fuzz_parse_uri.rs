#![no_main]

use libfuzzer_sys::fuzz_target;
use xproto_connect::ConnectionDescriptor;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = std::str::from_utf8(data) else {
        return;
    };

    // Parsing must never panic, and every accepted descriptor must survive
    // its own canonical form once auth is concrete.
    let input = format!("mysqlx://{}", body);
    if let Ok(descriptor) = ConnectionDescriptor::parse(&input) {
        let canonical = ConnectionDescriptor::parse(&descriptor.to_uri())
            .expect("canonical URI must parse");
        let again = ConnectionDescriptor::parse(&canonical.to_uri())
            .expect("canonical URI must parse twice");
        assert_eq!(canonical, again);
        let _ = descriptor.redacted_uri();
    }
});
