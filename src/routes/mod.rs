/// Router Module Index
///
/// Routes are split by the access they require; the gate is applied once per
/// module with a route layer in `create_router`, never left to individual
/// handlers. Modules may share paths with different methods (e.g. public
/// `GET /posts/{id}` and staff `PATCH /posts/{id}`); the routers are merged.

/// Routes open to anonymous visitors: published content, form rendering and
/// submission, search, analytics and sign-in.
pub mod public;

/// Routes requiring any signed-in account (self-service profile).
pub mod authenticated;

/// Back-office routes: content management for staff, user administration for
/// admins.
pub mod admin;

/// Crawler files served at the site root rather than under `/api`.
pub mod seo;
