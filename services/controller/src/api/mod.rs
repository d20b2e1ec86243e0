//! Resource schemas.
//!
//! `v1` holds the StaticPage kind together with the ConfigMap and Pod
//! shapes it derives; `meta` holds metadata shared by all of them.

pub mod meta;
pub mod v1;

pub use meta::{ObjectMeta, OwnerReference, Resource};
pub use v1::{
    ConfigMap, ConfigMapVolumeSource, Container, Pod, PodSpec, StaticPage, StaticPageSpec,
    StaticPageStatus, Volume, VolumeMount,
};
