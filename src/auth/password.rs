use crate::error::AppError;

/// Shortest password accepted at registration and reset.
pub const MIN_PASSWORD_LENGTH: u64 = 6;

/// Salted one-way password hashing (bcrypt).
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        bcrypt::hash(password, self.cost)
            .map_err(|e| {
                AppError::InternalServerError(format!("Failed to hash password: {}", e))
            })
    }

    pub fn verify(&self, password: &str, hashed_password: &str) -> Result<bool, AppError> {
        bcrypt::verify(password, hashed_password)
            .map_err(|e| {
                AppError::InternalServerError(format!("Failed to verify password: {}", e))
            })
    }

    /// `hash` on the blocking thread pool; bcrypt is deliberately slow.
    pub async fn hash_async(&self, password: String) -> Result<String, AppError> {
        let hasher = *self;
        let task = tokio::task::spawn_blocking(move || hasher.hash(&password));
        task.await?
    }

    /// `verify` on the blocking thread pool.
    pub async fn verify_async(
        &self,
        password: String,
        hashed_password: String,
    ) -> Result<bool, AppError> {
        let hasher = *self;
        let task = tokio::task::spawn_blocking(move || hasher.verify(&password, &hashed_password));
        task.await?
    }
}
