pub mod activation_service;
pub mod auth_service;
pub mod comment_service;
pub mod currency_service;
pub mod favorite_service;
pub mod mail_service;
pub mod recipe_api_service;
pub mod recipe_service;
pub mod token_service;
