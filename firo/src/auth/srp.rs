//! Secure remote password client.
//!
//! Group parameters and proof layout are fixed by the server. The proof is
//! `H(H(N) ^ H(g) mod N, H(user), salt, A, B, K)`, with `H` being sha1 for
//! `Srp` and sha256 for `Srp256`, while the session key `K` is always sha1.
use num_bigint::BigUint;
use rand::Rng;
use sha1::{Digest, Sha1};
use sha2::Sha256;

use super::AuthError;

const PRIME: &[u8] = b"E67D2E994B2F900C3F41F08F5BB2627ED0D49EE1FE767A52EFCD565CD6E768812C3E1E9CE8F0A8BEA6CB13CD29DDEBF7A96D4A93B55D488DF099A15C89DCB0640738EB2CBDD9A8F7BAB561AB1B0DC1C6CDABF303264A08D1BCA932D1F1EE428B619D970F342ABA9A65793B8B2F041AE5364350C16F735F56ECBCA87BD57B29E7";
const GENERATOR: u32 = 2;
const MULTIPLIER: &[u8] = b"1277432915985975349439481660349303019122249719989";

/// Proof digest, selected by plugin name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofDigest {
    Sha1,
    Sha256,
}

struct Group {
    prime: BigUint,
    generator: BigUint,
    multiplier: BigUint,
}

impl Group {
    fn get() -> Group {
        Group {
            prime: parse(PRIME, 16),
            generator: BigUint::from(GENERATOR),
            multiplier: parse(MULTIPLIER, 10),
        }
    }
}

fn parse(digits: &[u8], radix: u32) -> BigUint {
    // constants are valid digits
    BigUint::parse_bytes(digits, radix).unwrap_or_default()
}

fn sha1(parts: &[&[u8]]) -> [u8; 20] {
    let mut hash = Sha1::new();
    for part in parts {
        hash.update(part);
    }
    hash.finalize().into()
}

fn to_int(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

/// Minimal big endian bytes.
fn to_bytes(int: &BigUint) -> Vec<u8> {
    int.to_bytes_be()
}

/// Client side of the exchange, holds the ephemeral key pair.
pub struct SrpClient {
    private: BigUint,
    public: BigUint,
}

/// Result of a completed exchange.
#[derive(Debug)]
pub struct SrpProof {
    /// Client proof `M`, sent to the server.
    pub proof: Vec<u8>,
    /// Session key `K`, used as wire crypt key.
    pub session_key: Vec<u8>,
}

impl SrpClient {
    /// Generate a key pair with a random 128 bit private key.
    pub fn new() -> SrpClient {
        let private: u128 = rand::thread_rng().r#gen();
        Self::with_private(BigUint::from(private))
    }

    pub fn with_private(private: BigUint) -> SrpClient {
        let group = Group::get();
        let public = group.generator.modpow(&private, &group.prime);
        SrpClient { private, public }
    }

    /// Client public value `A`.
    pub fn public_key(&self) -> &BigUint {
        &self.public
    }

    /// Hex encoded `A`, as sent in the user identification block.
    pub fn public_hex(&self) -> String {
        hex::encode(to_bytes(&self.public))
    }

    /// Compute the proof for the server challenge.
    pub fn proof(
        &self,
        user: &str,
        password: &str,
        salt: &[u8],
        server_public: &BigUint,
        digest: ProofDigest,
    ) -> SrpProof {
        let Group { prime, generator, multiplier } = Group::get();
        let a = to_bytes(&self.public);
        let b = to_bytes(server_public);

        let scramble = to_int(&sha1(&[&a, &b]));
        let user_hash = to_int(&sha1(&[salt, &sha1(&[user.as_bytes(), b":", password.as_bytes()])]));

        let gx = generator.modpow(&user_hash, &prime);
        let kgx = (&multiplier * gx) % &prime;
        let diff = ((server_public % &prime) + &prime - kgx) % &prime;
        let ux = (scramble * &user_hash) % &prime;
        let exponent = (&self.private + ux) % &prime;
        let secret = diff.modpow(&exponent, &prime);
        let session_key = sha1(&[&to_bytes(&secret)]).to_vec();

        let n1 = to_int(&sha1(&[&to_bytes(&prime)]));
        let n2 = to_int(&sha1(&[&to_bytes(&generator)]));
        let n3 = to_bytes(&n1.modpow(&n2, &prime));
        let n4 = to_bytes(&to_int(&sha1(&[user.as_bytes()])));

        let parts: [&[u8]; 6] = [&n3, &n4, salt, &a, &b, &session_key];
        let proof = match digest {
            ProofDigest::Sha1 => sha1(&parts).to_vec(),
            ProofDigest::Sha256 => {
                let mut hash = Sha256::new();
                for part in parts {
                    hash.update(part);
                }
                hash.finalize().to_vec()
            },
        };

        SrpProof { proof, session_key }
    }
}

impl Default for SrpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SrpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrpClient").finish_non_exhaustive()
    }
}

/// Server challenge: little endian 2 byte salt length, salt, little endian 2
/// byte key length, hex encoded `B`.
pub fn parse_challenge(data: &[u8]) -> Result<(&[u8], BigUint), AuthError> {
    let malformed = || AuthError::Malformed("srp challenge");
    let salt_len = data.get(..2).ok_or_else(malformed)?;
    let salt_len = u16::from_le_bytes([salt_len[0], salt_len[1]]) as usize;
    let salt = data.get(2..2 + salt_len).ok_or_else(malformed)?;
    let key = data.get(4 + salt_len..).ok_or_else(malformed)?;
    let key = BigUint::parse_bytes(key, 16).ok_or_else(malformed)?;
    Ok((salt, key))
}

#[cfg(test)]
mod test {
    use super::*;

    const A: &str = "712c5f8a2db82464c4d640ae971025aa50ab64906d4f044f822e8af8a58adabbdbe1efaba00bccd4cdaa8a955bc43c3600beab9ebb9bd41acc56e37f1a48f17293f24e876b53eea6a60712d3f943769056b63202416827b400e162a8c0938d482274307585e0bc1d9dd52efa7330b28e41b7cfcefd9e8523fd11440ee5de93a8";
    const B: &str = "060a71cc13ceae1c47c1713d5d2cef5cf1d13ac1bb23955655462113ab151a3b26354a1a6658ef78a60a1b1319e12763dedaba7662925c00052cf7519b6e80b2f0803643c573c2976ddb273e7ed2b7a7d719a897c20eccff5b4aa15118c702e94f0b5a7e086e2bce4c8b6633fd0950407e3362728cb1270caa0c0dcd76d1ba0c";

    fn client() -> SrpClient {
        let private = b"60975527035CF2AD1989806F0407210BC81EDC04E2762A56AFD529DDDA2D4393";
        SrpClient::with_private(BigUint::parse_bytes(private, 16).unwrap())
    }

    fn salt() -> Vec<u8> {
        (0..32).collect()
    }

    #[test]
    fn public_key() {
        assert_eq!(client().public_hex(), A);
    }

    #[test]
    fn sha1_proof() {
        let b = BigUint::parse_bytes(B.as_bytes(), 16).unwrap();
        let out = client().proof("SYSDBA", "masterkey", &salt(), &b, ProofDigest::Sha1);
        assert_eq!(hex::encode(&out.session_key), "a25b0e1017b9cfa7ac6cee223759742fe0f8455b");
        assert_eq!(hex::encode(&out.proof), "b207913114f9bfb4caf2ebf4bf6c69695f688bef");
    }

    #[test]
    fn sha256_proof() {
        let b = BigUint::parse_bytes(B.as_bytes(), 16).unwrap();
        let out = client().proof("SYSDBA", "masterkey", &salt(), &b, ProofDigest::Sha256);
        assert_eq!(hex::encode(&out.session_key), "a25b0e1017b9cfa7ac6cee223759742fe0f8455b");
        assert_eq!(
            hex::encode(&out.proof),
            "759fac7683c263bfc5a06c2db563aa99a92c5ea3f1230d272cb3f7af860a795c"
        );
    }

    #[test]
    fn challenge_layout() {
        let mut data = vec![32, 0];
        data.extend(salt());
        data.extend((B.len() as u16).to_le_bytes());
        data.extend(B.as_bytes());
        let (s, b) = parse_challenge(&data).unwrap();
        assert_eq!(s, &salt()[..]);
        assert_eq!(hex::encode(b.to_bytes_be()), B);
        assert!(parse_challenge(&[5]).is_err());
    }

    #[test]
    fn random_keys_differ() {
        assert_ne!(SrpClient::new().public_key(), SrpClient::new().public_key());
    }
}
