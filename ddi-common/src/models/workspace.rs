//! User workspace: users, baskets of variables, script settings

use super::{validate_name, Dataset, Entity, Variable};
use crate::db::schema::Table;
use crate::db::store::Store;
use crate::db::tables;
use crate::ids::{normalize_name, IdDeriver};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: Uuid,
    pub username: String,
}

impl User {
    pub fn new(ids: &IdDeriver, username: &str) -> Self {
        Self {
            id: ids.user(username),
            username: normalize_name(username),
        }
    }
}

impl Entity for User {
    fn table() -> &'static Table {
        &tables::USERS
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<()> {
        validate_name("user", &self.username)
    }
}

/// Named collection of variables, owned by a user and bound to one study
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Basket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub study_id: Uuid,
    pub name: String,
    pub label: String,
    pub description: String,
}

impl Basket {
    pub fn new(ids: &IdDeriver, user_id: Uuid, study_id: Uuid, name: &str) -> Self {
        Self {
            id: ids.child(user_id, name),
            user_id,
            study_id,
            name: normalize_name(name),
            ..Default::default()
        }
    }
}

impl Entity for Basket {
    fn table() -> &'static Table {
        &tables::BASKETS
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<()> {
        validate_name("basket", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasketVariable {
    pub id: Uuid,
    pub basket_id: Uuid,
    pub variable_id: Uuid,
}

impl BasketVariable {
    pub fn new(ids: &IdDeriver, basket_id: Uuid, variable_id: Uuid) -> Self {
        Self {
            id: ids.derive(basket_id, &variable_id.to_string()),
            basket_id,
            variable_id,
        }
    }

    /// A variable may only join a basket of its own study
    pub async fn clean(&self, store: &dyn Store) -> Result<()> {
        let basket = fetch::<Basket>(store, self.basket_id).await?;
        let variable = fetch::<Variable>(store, self.variable_id).await?;
        let dataset = fetch::<Dataset>(store, variable.dataset_id).await?;

        if basket.study_id != dataset.study_id {
            return Err(Error::validation(
                "basket_variable",
                format!(
                    "variable {} belongs to study {}, basket {} to study {}",
                    variable.name, dataset.study_id, basket.name, basket.study_id
                ),
            ));
        }
        Ok(())
    }
}

async fn fetch<E: Entity>(store: &dyn Store, id: Uuid) -> Result<E> {
    match store.fetch(E::table(), id).await? {
        Some(record) => E::from_record(record),
        None => Err(Error::NotFound(format!("{} {}", E::table().name, id))),
    }
}

impl Entity for BasketVariable {
    fn table() -> &'static Table {
        &tables::BASKET_VARIABLES
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Stored settings for one script generator run on a basket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Script {
    pub id: Uuid,
    pub basket_id: Uuid,
    pub name: String,
    pub label: String,
    /// Generator the settings belong to (`soep-stata`, `soep-r`, ...)
    pub generator_name: String,
    pub settings: Value,
}

impl Script {
    pub fn new(ids: &IdDeriver, basket_id: Uuid, name: &str) -> Self {
        Self {
            id: ids.child(basket_id, name),
            basket_id,
            name: normalize_name(name),
            settings: Value::Object(Default::default()),
            ..Default::default()
        }
    }
}

impl Entity for Script {
    fn table() -> &'static Table {
        &tables::SCRIPTS
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<()> {
        validate_name("script", &self.name)?;
        if !self.settings.is_object() {
            return Err(Error::validation("script", "settings must be a JSON object"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::repository::Repository;
    use crate::models::Study;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_clean_rejects_cross_study_variable() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ids = IdDeriver::new(Uuid::new_v4());

        let soep = Study::new(&ids, "soep-core");
        let other = Study::new(&ids, "other-study");
        Repository::<Study>::new(store.clone()).upsert_many(&[soep.clone(), other.clone()]).await.unwrap();

        let dataset = Dataset::new(&ids, other.id, "d1");
        Repository::<Dataset>::new(store.clone()).upsert(&dataset).await.unwrap();
        let variable = Variable::new(&ids, dataset.id, "v1");
        Repository::<Variable>::new(store.clone()).upsert(&variable).await.unwrap();

        let user = User::new(&ids, "alice");
        Repository::<User>::new(store.clone()).upsert(&user).await.unwrap();
        let basket = Basket::new(&ids, user.id, soep.id, "mine");
        Repository::<Basket>::new(store.clone()).upsert(&basket).await.unwrap();

        let entry = BasketVariable::new(&ids, basket.id, variable.id);
        assert!(matches!(
            entry.clean(store.as_ref()).await,
            Err(Error::Validation { .. })
        ));

        let same_study = Basket::new(&ids, user.id, other.id, "theirs");
        Repository::<Basket>::new(store.clone()).upsert(&same_study).await.unwrap();
        let entry = BasketVariable::new(&ids, same_study.id, variable.id);
        assert!(entry.clean(store.as_ref()).await.is_ok());
    }
}
