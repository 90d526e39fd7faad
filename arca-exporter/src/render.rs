//! Config Renderer (§4.5): deterministic, order-independent in the input
//! set but order-stable in the output, stamped with a hash of the rendered
//! body. Output shape follows §6's ganesha.conf field list: a global
//! protocol/port block, a defaults block, and one EXPORT block per Export.

use sha2::{Digest, Sha256};

use arca_common::model::{Access, Export, SecFlavor, Squash};

/// Global protocol/port knobs (§4.4: "NFSv4 by default, optionally NFSv3
/// ... protocols and fixed ports are global knobs read from a runtime
/// config").
#[derive(Debug, Clone)]
pub struct ExporterProtocolConfig {
    pub nfsv3_enabled: bool,
    pub mountd_port: Option<u16>,
    pub nlm_port: Option<u16>,
}

impl Default for ExporterProtocolConfig {
    fn default() -> Self {
        Self {
            nfsv3_enabled: false,
            mountd_port: None,
            nlm_port: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    pub body: String,
    pub config_version: String,
}

fn sec_token(sec: &[SecFlavor]) -> String {
    sec.iter()
        .map(|s| match s {
            SecFlavor::Sys => "sys",
            SecFlavor::Krb5 => "krb5",
            SecFlavor::Krb5i => "krb5i",
            SecFlavor::Krb5p => "krb5p",
        })
        .collect::<Vec<_>>()
        .join(":")
}

fn protocols_token(protocol: &ExporterProtocolConfig) -> &'static str {
    if protocol.nfsv3_enabled {
        "3,4"
    } else {
        "4"
    }
}

/// Renders the exporter config for one SVM. Exports are sorted by
/// `export_id` ascending regardless of input order (§4.5), so the output is
/// identical for any permutation of the same export set.
pub fn render(
    template_version: &str,
    protocol: &ExporterProtocolConfig,
    exports: &[Export],
) -> RenderedConfig {
    let mut sorted: Vec<&Export> = exports.iter().collect();
    sorted.sort_by_key(|e| e.export_id);

    let mut body = String::new();
    body.push_str(&format!("# template_version = {template_version}\n"));

    body.push_str("NFS_CORE_PARAM {\n");
    body.push_str(&format!("\tProtocols = {};\n", protocols_token(protocol)));
    if protocol.nfsv3_enabled {
        if let Some(port) = protocol.mountd_port {
            body.push_str(&format!("\tMNT_Port = {port};\n"));
        }
        if let Some(port) = protocol.nlm_port {
            body.push_str(&format!("\tNLM_Port = {port};\n"));
        }
    }
    body.push_str("}\n");

    body.push_str("EXPORT_DEFAULTS {\n\tAccess_Type = RO;\n\tSquash = root_squash;\n}\n");

    for export in sorted {
        let access = match export.access {
            Access::Rw => "RW",
            Access::Ro => "RO",
        };
        let squash = match export.squash {
            Squash::RootSquash => "root_squash",
            Squash::NoRootSquash => "no_root_squash",
        };
        body.push_str(&format!(
            "EXPORT {{\n\
             \tExport_Id = {};\n\
             \tPath = \"{}\";\n\
             \tPseudo = \"{}\";\n\
             \tProtocols = {};\n\
             \tAccess_Type = {};\n\
             \tSquash = {};\n\
             \tSecType = {};\n\
             \tCLIENT {{\n\
             \t\tClients = {};\n\
             \t}}\n\
             \tFSAL {{\n\
             \t\tName = VFS;\n\
             \t}}\n\
             }}\n",
            export.export_id,
            export.path,
            export.pseudo,
            protocols_token(protocol),
            access,
            squash,
            sec_token(&export.sec),
            export.client_cidr,
        ));
    }

    let config_version = format!("{:x}", Sha256::digest(body.as_bytes()));
    body = format!("# config_version = {config_version}\n{body}");

    RenderedConfig { body, config_version }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn export(export_id: u32, client_cidr: &str, access: Access) -> Export {
        Export {
            export_id,
            svm: "tenant_a".into(),
            volume: "vol1".into(),
            client_cidr: client_cidr.into(),
            access,
            squash: Squash::RootSquash,
            sec: vec![SecFlavor::Sys],
            path: "/exports/tenant_a/vol1".into(),
            pseudo: "/exports/tenant_a/vol1".into(),
        }
    }

    #[test]
    fn rendering_is_order_independent_but_output_is_sorted_by_export_id() {
        let e1 = export(1, "10.0.0.0/24", Access::Rw);
        let e2 = export(2, "10.1.0.0/24", Access::Ro);
        let protocol = ExporterProtocolConfig::default();

        let forward = render("v1", &protocol, &[e1.clone(), e2.clone()]);
        let reverse = render("v1", &protocol, &[e2, e1]);

        assert_eq!(forward.body, reverse.body);
        assert_eq!(forward.config_version, reverse.config_version);

        let first_block = forward.body.find("Export_Id = 1").unwrap();
        let second_block = forward.body.find("Export_Id = 2").unwrap();
        assert!(first_block < second_block);
    }

    #[test]
    fn config_version_changes_with_content() {
        let protocol = ExporterProtocolConfig::default();
        let a = render("v1", &protocol, &[export(1, "10.0.0.0/24", Access::Rw)]);
        let b = render("v1", &protocol, &[export(1, "10.0.0.0/24", Access::Ro)]);
        assert_ne!(a.config_version, b.config_version);
    }

    #[test]
    fn empty_export_set_still_renders_deterministically() {
        let protocol = ExporterProtocolConfig::default();
        let a = render("v1", &protocol, &[]);
        let b = render("v1", &protocol, &[]);
        assert_eq!(a.body, b.body);
        assert_eq!(a.config_version, b.config_version);
    }

    #[test]
    fn nfsv3_enables_fixed_ports_in_core_param_block() {
        let protocol = ExporterProtocolConfig {
            nfsv3_enabled: true,
            mountd_port: Some(892),
            nlm_port: Some(32803),
        };
        let rendered = render("v1", &protocol, &[]);
        assert!(rendered.body.contains("Protocols = 3,4;"));
        assert!(rendered.body.contains("MNT_Port = 892;"));
        assert!(rendered.body.contains("NLM_Port = 32803;"));
    }
}
