use proptest::prelude::*;

/// Strictly increasing cursors with gaps, as the remote assigns them
pub fn cursor_stream_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(1u64..5, 1..60).prop_map(|gaps| {
        gaps.iter()
            .scan(0u64, |cursor, gap| {
                *cursor += gap;
                Some(*cursor)
            })
            .collect()
    })
}

pub fn page_size_strategy() -> impl Strategy<Value = usize> {
    1usize..12
}

pub fn concurrency_strategy() -> impl Strategy<Value = usize> {
    1usize..9
}
