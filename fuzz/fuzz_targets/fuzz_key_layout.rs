#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use revtree_db::data::KeyLayout;

#[derive(Arbitrary, Debug)]
struct LayoutInput {
    leaf_bits: u8,
    level_bits: Vec<u8>,
    keys: Vec<u64>,
}

fuzz_target!(|input: LayoutInput| {
    if input.level_bits.len() > 8 || input.keys.len() > 64 {
        return;
    }
    let Ok(layout) = KeyLayout::new(input.leaf_bits, input.level_bits) else {
        return;
    };

    for key in input.keys {
        match layout.path(key) {
            Ok(path) => {
                assert!(key <= layout.max_key());
                assert_eq!(path.offsets.len(), layout.levels());
                assert_eq!(path.page_key, layout.page_key(key));
                assert_eq!(path.offsets, layout.page_offsets(path.page_key));

                // Offsets and slot reassemble the key.
                let mut rebuilt = 0u64;
                for (level, offset) in path.offsets.iter().enumerate() {
                    assert!(*offset < layout.fanout(level));
                    rebuilt = (rebuilt << layout.level_bits()[level]) | *offset as u64;
                }
                rebuilt = (rebuilt << layout.leaf_bits()) | path.slot as u64;
                assert_eq!(rebuilt, key);
            }
            Err(_) => assert!(key > layout.max_key()),
        }
    }
});
