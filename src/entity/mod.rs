pub mod cart_items;
pub mod carts;
pub mod checkout_items;
pub mod checkouts;
pub mod coupons;
pub mod products;
pub mod variants;

pub use cart_items::Entity as CartItems;
pub use carts::Entity as Carts;
pub use checkout_items::Entity as CheckoutItems;
pub use checkouts::Entity as Checkouts;
pub use coupons::Entity as Coupons;
pub use products::Entity as Products;
pub use variants::Entity as Variants;
