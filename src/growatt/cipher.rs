use crate::prelude::*;

/// The payload obfuscation used by protocol variants 5 and 6; a byte-wise
/// XOR against a cycled key. Applying it twice returns the input.
#[derive(Clone, Debug)]
pub struct Cipher {
    key: Vec<u8>,
}

impl Cipher {
    pub fn new(key: &str) -> Result<Self> {
        if key.is_empty() {
            bail!("obfuscation key must not be empty");
        }

        Ok(Self {
            key: key.as_bytes().to_vec(),
        })
    }

    pub fn apply(&self, data: &[u8]) -> Vec<u8> {
        data.iter()
            .enumerate()
            .map(|(i, b)| b ^ self.key[i % self.key.len()])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> Cipher {
        Cipher::new("Growatt").unwrap()
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(Cipher::new("").is_err());
    }

    #[test]
    fn empty_data_stays_empty() {
        assert_eq!(cipher().apply(&[]), Vec::<u8>::new());
    }

    #[test]
    fn known_transform() {
        // first byte of a captured serial: 'A' ^ 'G' == 0x06
        assert_eq!(cipher().apply(b"ABC1D2345E")[0], 0x06);
        // zero bytes come out as the cycled key itself
        assert_eq!(cipher().apply(&[0; 9]), b"GrowattGr".to_vec());
    }

    #[test]
    fn involution() {
        let c = cipher();
        let data: Vec<u8> = (0..=255).collect();
        assert_eq!(c.apply(&c.apply(&data)), data);
    }

    #[test]
    fn involution_with_short_key() {
        let c = Cipher::new("k").unwrap();
        let data = b"some longer payload".to_vec();
        assert_eq!(c.apply(&c.apply(&data)), data);
    }
}
