//! Generated CSI message/service bindings (`proto/csi.proto`, package `csi.v1`).
#![allow(clippy::all)]

tonic::include_proto!("csi.v1");
