use uuid::Uuid;

use crate::{Error, Role, Time, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn stub() -> UserId {
        UserId(STUB_UUID)
    }
}

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct LinkId(pub i64);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct UserLink {
    pub id: LinkId,
    pub url: String,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub bio: String,
    pub image: Option<String>,
    pub created_at: Time,
    pub links: Vec<UserLink>,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewUser {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub links: Vec<String>,
}

impl NewUser {
    pub fn new(id: UserId, name: String) -> NewUser {
        NewUser {
            id,
            name,
            role: Role::User,
            bio: String::new(),
            image: None,
            links: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.name)?;
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(Error::InvalidName(self.name.clone()));
        }
        self.profile().validate()
    }

    pub fn profile(&self) -> ProfileUpdate {
        ProfileUpdate {
            bio: self.bio.clone(),
            image: self.image.clone(),
            links: self.links.clone(),
        }
    }
}

/// Replaces the editable parts of a profile; links are replaced as a whole
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ProfileUpdate {
    pub bio: String,
    pub image: Option<String>,
    pub links: Vec<String>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.bio)?;
        if let Some(image) = &self.image {
            crate::validate_url(image)?;
        }
        for l in &self.links {
            crate::validate_url(l)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_names() {
        let mut u = NewUser::new(UserId::stub(), String::from("ada.lovelace-1"));
        assert_eq!(u.validate(), Ok(()));
        u.name = String::from("ada lovelace");
        assert_eq!(u.validate(), Err(Error::InvalidName(u.name.clone())));
        u.name = String::new();
        assert_eq!(u.validate(), Err(Error::InvalidName(String::new())));
    }

    #[test]
    fn new_user_defaults() {
        let u: NewUser = serde_json::from_value(serde_json::json!({
            "id": UserId::stub(),
            "name": "grace",
        }))
        .unwrap();
        assert_eq!(u.role, Role::User);
        assert!(u.bio.is_empty() && u.image.is_none() && u.links.is_empty());
    }
}
