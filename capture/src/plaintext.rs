use rand::RngCore;

/// A plaintext generator of uniformly random `len` byte blocks drawn from `rng`.
pub fn plaintext_from<R: RngCore>(mut rng: R, len: usize) -> impl FnMut() -> Vec<u8> {
    move || {
        let mut block = vec![0; len];
        rng.fill_bytes(&mut block);
        block
    }
}

/// Random plaintexts from the thread-local generator.
pub fn random_plaintext(len: usize) -> impl FnMut() -> Vec<u8> {
    plaintext_from(rand::rng(), len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn random_blocks_have_requested_length_and_differ() {
        let mut generate = plaintext_from(StdRng::seed_from_u64(7), 16);
        let first = generate();
        let second = generate();
        assert_eq!(first.len(), 16);
        assert_eq!(second.len(), 16);
        assert_ne!(first, second);
    }
}
