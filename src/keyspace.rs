use rand::Rng;

/// The fixed set of keys a run addresses.
///
/// Keys are integer indices mapped to backend-visible names by a
/// deterministic prefixing rule; no key is created or destroyed mid-run.
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
    size: usize,
}

impl KeySpace {
    pub fn new(prefix: &str, size: usize) -> Self {
        Self {
            prefix: prefix.to_string(),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Backend-visible name for a key index.
    pub fn name(&self, key: usize) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Uniformly random key index.
    pub fn draw<R: Rng>(&self, rng: &mut R) -> usize {
        rng.random_range(0..self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn names_are_deterministic() {
        let keys = KeySpace::new("doc:1-", 50);
        assert_eq!(keys.name(0), "doc:1-0");
        assert_eq!(keys.name(49), "doc:1-49");
    }

    #[test]
    fn draw_stays_in_range() {
        let keys = KeySpace::new("key:", 7);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            assert!(keys.draw(&mut rng) < 7);
        }
    }
}
