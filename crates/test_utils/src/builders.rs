//! Test Data Builders
//!
//! Builders for test records. Tests set only the fields they care about;
//! everything else gets a random but valid value from `fake`.

use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;

use crate::models::{new_public_id, TestCar, TestUser};

/// Builder for [`TestUser`] records
#[derive(Debug, Clone)]
pub struct TestUserBuilder {
    user: TestUser,
}

impl Default for TestUserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestUserBuilder {
    /// Creates a builder with a random unique name, email and phone number
    pub fn new() -> Self {
        let name: String = Name().fake();
        let mut user = TestUser::new();
        user.name = format!("{} {}", name, new_public_id("n"));
        user.email = SafeEmail().fake();
        user.phone_number = PhoneNumber().fake();
        Self { user }
    }

    pub fn with_public_id(mut self, id: impl Into<String>) -> Self {
        self.user.public_id = id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.user.name = name.into();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.user.email = email.into();
        self
    }

    pub fn with_phone_number(mut self, phone: impl Into<String>) -> Self {
        self.user.phone_number = phone.into();
        self
    }

    /// Leaves the email empty so the store default applies
    pub fn without_email(mut self) -> Self {
        self.user.email.clear();
        self
    }

    pub fn build(self) -> TestUser {
        self.user
    }
}

/// Builder for [`TestCar`] records
#[derive(Debug, Clone)]
pub struct TestCarBuilder {
    car: TestCar,
}

impl Default for TestCarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestCarBuilder {
    pub fn new() -> Self {
        Self {
            car: TestCar {
                name: format!("car-{}", new_public_id("n")),
                model: "hatchback".to_string(),
                mpg: (15..60).fake(),
                ..TestCar::new()
            },
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.car.model = model.into();
        self
    }

    pub fn with_mpg(mut self, mpg: i32) -> Self {
        self.car.mpg = mpg;
        self
    }

    pub fn build(self) -> TestCar {
        self.car
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_builder() {
        let user = TestUserBuilder::new()
            .with_name("carol")
            .without_email()
            .build();
        assert_eq!(user.name, "carol");
        assert!(user.email.is_empty());
        assert!(!user.phone_number.is_empty());
        assert!(user.public_id.starts_with("u_"));
    }

    #[test]
    fn test_car_builder() {
        let car = TestCarBuilder::new().with_mpg(12).build();
        assert_eq!(car.mpg, 12);
        assert_eq!(car.model, "hatchback");
    }
}
