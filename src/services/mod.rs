pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod credentials;
pub mod flow;
pub mod mercadopago;
pub mod orders;
pub mod payments;
pub mod reconciliation;

pub use carts::{CartOwner, CartService, CartWithItems};
pub use catalog::{CatalogService, ProductFilter};
pub use checkout::{CheckoutInput, CheckoutService};
pub use credentials::{CredentialService, NewCredentials};
pub use flow::{FlowGateway, PaymentGateway, PaymentOutcome};
pub use mercadopago::MercadoPagoService;
pub use orders::{OrderDetail, OrderService};
pub use payments::{PaymentService, StartedPayment};
pub use reconciliation::{ReconciliationOutcome, ReconciliationService};
