use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Entity, EntityKind, Merchant, NewMerchant};
use crate::error::PaymentError;
use crate::ports::{
    Filter, MerchantLookup, RepositoryError, RepositoryResult, Storage, MERCHANT_EMAIL_KEY,
    MERCHANT_NAME_KEY,
};
use crate::validation::{sanitize_string, validate_merchant, ValidationError};

#[derive(Clone)]
pub struct MerchantService {
    storage: Arc<dyn Storage>,
}

impl MerchantService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Registers a merchant with a zero balance. Name and email must be unused.
    pub async fn create(&self, mut input: NewMerchant) -> Result<Merchant, PaymentError> {
        input.name = sanitize_string(&input.name);
        input.email = input.email.trim().to_string();
        validate_merchant(&input)?;

        let merchant = Merchant::from_input(input);
        let id = merchant.id;
        let created = self
            .storage
            .create(Entity::from(merchant))
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict(constraint) if constraint == MERCHANT_NAME_KEY => {
                    PaymentError::Conflict("merchant name already registered".to_string())
                }
                RepositoryError::Conflict(constraint) if constraint == MERCHANT_EMAIL_KEY => {
                    PaymentError::Conflict("merchant email already registered".to_string())
                }
                other => PaymentError::storage("create", EntityKind::Merchant, id)(other),
            })?
            .into_merchant()
            .map_err(PaymentError::storage("create", EntityKind::Merchant, id))?;

        info!(
            merchant_id = %created.id,
            name = %created.name,
            status = %created.status,
            "Merchant created"
        );
        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> Result<Merchant, PaymentError> {
        self.find_merchant(id).await.map_err(|err| {
            if err.is_not_found() {
                PaymentError::NotFound {
                    entity: "merchant",
                    id,
                }
            } else {
                PaymentError::storage("get", EntityKind::Merchant, id)(err)
            }
        })
    }

    pub async fn list(&self, filters: &[Filter]) -> Result<Vec<Merchant>, PaymentError> {
        let entities = self
            .storage
            .list(EntityKind::Merchant, filters)
            .await
            .map_err(|err| match err {
                invalid @ RepositoryError::InvalidFilter { .. } => {
                    PaymentError::from(ValidationError::new("filter", invalid.to_string()))
                }
                other => PaymentError::storage("list", EntityKind::Merchant, "*")(other),
            })?;

        entities
            .into_iter()
            .map(Entity::into_merchant)
            .collect::<Result<Vec<_>, _>>()
            .map_err(PaymentError::storage("list", EntityKind::Merchant, "*"))
    }
}

#[async_trait]
impl MerchantLookup for MerchantService {
    async fn find_merchant(&self, id: Uuid) -> RepositoryResult<Merchant> {
        self.storage
            .get(EntityKind::Merchant, id)
            .await?
            .into_merchant()
    }
}
