// Network layer module
// HTTP adapters for the backend API and the routing service

pub mod backend;
pub mod messages;
pub mod routing;

pub use backend::HttpGateway;
pub use messages::RouteDocument;
pub use routing::HttpRouter;
