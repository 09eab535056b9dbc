#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use revtree_db::data::DefaultNodeFactory;
use revtree_db::store::PageCodec;

fuzz_target!(|data: &[u8]| {
    let codec = PageCodec::new(Arc::new(DefaultNodeFactory));

    // Decoding arbitrary bytes must fail cleanly or yield a page that
    // re-encodes to the same bytes.
    if let Ok(page) = codec.decode(data) {
        let encoded = codec.encode(&page).expect("decoded page must encode");
        let again = codec.decode(&encoded).expect("encoded page must decode");
        assert_eq!(page, again);
    }
});
