use checkpoint_index::{AccountIndexSet, CheckpointIndex, FlushRequest};

/// Index set with one category per `(name, checkpoints)` pair
pub fn index_set(entries: &[(&str, &[u32])]) -> AccountIndexSet {
    entries
        .iter()
        .map(|(name, checkpoints)| {
            let index = CheckpointIndex::with_checkpoints(checkpoints.iter().copied())
                .expect("fixture checkpoints start at 1");
            (name.to_string(), index)
        })
        .collect()
}

/// Flush request covering `count` generated accounts
pub fn generated_request(count: usize) -> FlushRequest {
    (0..count)
        .map(|i| {
            let checkpoint = i as u32 + 1;
            (
                format!("GACCOUNT{i:04}"),
                index_set(&[("account", &[checkpoint]), ("asset", &[checkpoint, checkpoint + 64])]),
            )
        })
        .collect()
}
