use {
    rand::{
        Rng, RngCore,
        distr::{Alphanumeric, SampleString},
    },
    sealpost_protocol::CHUNK_SIZE,
};

pub fn random_name() -> String {
    let mut rng = rand::rng();
    let len = rng.random_range(1..=12);
    format!("{}.bin", Alphanumeric.sample_string(&mut rng, len))
}

/// Random content, biased towards sizes around chunk boundaries.
pub fn random_content() -> Vec<u8> {
    let mut rng = rand::rng();
    let len = match rng.random_range(0..6) {
        0 => 0,
        1 => rng.random_range(1..100),
        2 => CHUNK_SIZE,
        3 => CHUNK_SIZE.saturating_sub(1),
        4 => CHUNK_SIZE.saturating_add(1),
        _ => rng.random_range(0..CHUNK_SIZE.saturating_mul(3)),
    };
    let mut content = vec![0; len];
    rng.fill_bytes(&mut content);
    content
}

/// A batch of files where some repeat content from `previous` or from
/// earlier files of the same batch.
pub fn random_batch(previous: &[Vec<u8>]) -> Vec<(String, Vec<u8>)> {
    let mut rng = rand::rng();
    let count = rng.random_range(1..=6);
    let mut batch: Vec<(String, Vec<u8>)> = Vec::with_capacity(count);
    for index in 0..count {
        let content = {
            let earlier: Vec<&Vec<u8>> = previous
                .iter()
                .chain(batch.iter().map(|(_, content)| content))
                .collect();
            if !earlier.is_empty() && rng.random_bool(0.3) {
                let pick = rng.random_range(0..earlier.len());
                earlier
                    .get(pick)
                    .map_or_else(random_content, |content| (*content).clone())
            } else {
                random_content()
            }
        };
        batch.push((format!("{index}-{}", random_name()), content));
    }
    batch
}
