pub mod brand;
pub mod cart;
pub mod cart_item;
pub mod category;
pub mod flow_credentials;
pub mod order;
pub mod order_item;
pub mod order_tracking;
pub mod product;

pub use brand::Entity as Brand;
pub use cart::Entity as Cart;
pub use cart::Model as CartModel;
pub use cart_item::Entity as CartItem;
pub use category::Entity as Category;
pub use flow_credentials::Entity as FlowCredentials;
pub use order::Entity as Order;
pub use order::Model as OrderModel;
pub use order_item::Entity as OrderItem;
pub use order_tracking::Entity as OrderTracking;
pub use product::Entity as Product;
pub use product::Model as ProductModel;
