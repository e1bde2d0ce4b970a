pub mod user;

pub use user::{AuthProvider, NewUser, SecretDigest, User, UserProfile, UserUpdate};
