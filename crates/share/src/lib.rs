//! Share state for the catalog: capturing the live tree and view as a
//! document, carrying it in a link, and replaying it.

pub mod build;
pub mod config;
pub mod document;
pub mod error;
pub mod feedback;
pub mod link;
pub mod picking;
pub mod replay;
pub mod shortener;
pub mod view;

pub use build::{
    FilterVerdict, ItemFilter, NoLocalData, NotRegeneratedOnLoad, RejectionReason, ShareBuild,
    ShareBuilder, ShareRejection, UserSupplied, build_share_document,
};
pub use config::ShareConfig;
pub use document::{InitFragment, InitSource, SHARE_VERSION, ShareDocument, SharedMember};
pub use error::ShareError;
pub use feedback::{FeedbackForm, FeedbackSubmitError, submit_feedback};
pub use link::{
    DEFAULT_PARAM_WHITELIST, DecodedLink, LinkOptions, LinkPayload, decode, encode, encode_token,
    init_file_url,
};
pub use picking::{PickState, PickedEntity, PickedFeatures, entity_hash, picked_features};
pub use replay::{MemberFailure, ReplayReport, replay};
pub use shortener::{HttpShortLinkService, ShortLinkService, resolve, shorten_if_possible};
pub use view::{Camera, CameraView, LocationMarker, ViewState, ViewerMode};
