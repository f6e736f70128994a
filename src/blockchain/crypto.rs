use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use log::{info, warn};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Address used as the sender of freshly minted coins
pub const MINT_ADDRESS: &str = "0";

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(#[from] hex::FromHexError),

    #[error("Key file error: {0}")]
    KeyFileError(#[from] std::io::Error),

    #[error("Key file format error: {0}")]
    KeyFileFormat(#[from] serde_json::Error),
}

/// A wallet address: the hex-encoded ed25519 public key of its owner,
/// or [`MINT_ADDRESS`] for coinbase transfers
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub struct Address(pub String);

impl Address {
    /// Creates an address from a public key
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        Address(hex::encode(public_key.as_bytes()))
    }

    /// The address coinbase transfers are paid from
    pub fn mint() -> Self {
        Address(MINT_ADDRESS.to_string())
    }

    pub fn is_mint(&self) -> bool {
        self.0 == MINT_ADDRESS
    }

    /// Converts the address back to the public key it encodes
    pub fn to_public_key(&self) -> Result<VerifyingKey, CryptoError> {
        let bytes: [u8; 32] = hex::decode(&self.0)?
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey("expected 32 bytes".to_string()))?;

        VerifyingKey::from_bytes(&bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

/// A detached ed25519 signature. Parsed from hex once at ingress;
/// serialized back to lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DigitalSignature(Signature);

impl DigitalSignature {
    pub fn from_signature(signature: Signature) -> Self {
        DigitalSignature(signature)
    }

    pub fn as_signature(&self) -> &Signature {
        &self.0
    }
}

impl FromStr for DigitalSignature {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 64] = hex::decode(s.trim())?
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature("expected 64 bytes".to_string()))?;

        Ok(DigitalSignature(Signature::from_bytes(&bytes)))
    }
}

impl TryFrom<String> for DigitalSignature {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DigitalSignature> for String {
    fn from(signature: DigitalSignature) -> Self {
        signature.to_string()
    }
}

impl fmt::Display for DigitalSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0.to_bytes()))
    }
}

/// On-disk layout of a wallet key file
#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    private_key: String,
    public_key: String,
}

/// Represents a wallet with a keypair
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    address: Address,
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        Self::from_signing_key(SigningKey::generate(&mut csprng))
    }

    /// Creates a wallet from an existing hex-encoded secret key
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, CryptoError> {
        let bytes: [u8; 32] = hex::decode(secret_hex.trim())?
            .try_into()
            .map_err(|_| CryptoError::InvalidPrivateKey("expected 32 bytes".to_string()))?;

        Ok(Self::from_signing_key(SigningKey::from_bytes(&bytes)))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        let address = Address::from_public_key(&verifying_key);

        Wallet {
            signing_key,
            verifying_key,
            address,
        }
    }

    /// Reads the key pair stored at `path`, or generates and stores a fresh
    /// one when the file is missing or unreadable.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, CryptoError> {
        let path = path.as_ref();

        match Self::load(path) {
            Ok(wallet) => {
                info!("Loaded wallet {} from {}", wallet.address, path.display());
                Ok(wallet)
            }
            Err(err) => {
                warn!("Could not load wallet from {}: {}", path.display(), err);
                let wallet = Self::generate();
                wallet.save(path)?;
                info!("Generated wallet {} at {}", wallet.address, path.display());
                Ok(wallet)
            }
        }
    }

    fn load(path: &Path) -> Result<Self, CryptoError> {
        let contents = fs::read_to_string(path)?;
        let keys: KeyFile = serde_json::from_str(&contents)?;
        let wallet = Self::from_secret_hex(&keys.private_key)?;

        if wallet.address.0 != keys.public_key.trim() {
            return Err(CryptoError::InvalidPublicKey(
                "public key does not match private key".to_string(),
            ));
        }

        Ok(wallet)
    }

    fn save(&self, path: &Path) -> Result<(), CryptoError> {
        let keys = KeyFile {
            private_key: self.export_secret_hex(),
            public_key: self.address.0.clone(),
        };
        fs::write(path, serde_json::to_string(&keys)?)?;
        Ok(())
    }

    /// Gets the wallet's address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Gets the wallet's public key
    pub fn public_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Signs a message with the wallet's private key
    pub fn sign(&self, message: &[u8]) -> DigitalSignature {
        DigitalSignature(self.signing_key.sign(message))
    }

    /// Exports the wallet's secret key as hex
    pub fn export_secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }
}

/// Verifies a signature against a message and public key
pub fn verify_signature(message: &[u8], signature: &DigitalSignature, public_key: &VerifyingKey) -> bool {
    public_key.verify(message, signature.as_signature()).is_ok()
}
