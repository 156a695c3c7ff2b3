use serde::{Deserialize, Deserializer, Serialize};
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};

/// Trojan / VMess 节点共有的字段。
///
/// 网上的配置五花八门，这里只认得出类型正确的字段；类型不对或不认识的字段都留在 `extra` 中，
/// 输出时原样写回，这样生成的列表仍然能被 Clash 一类的客户端直接读取。
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProxyNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// 配置中的 `type` 字段（如 `trojan`、`vmess`），只做透传，不参与类型判断。
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub udp: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,

    #[serde(rename = "ws-opts", skip_serializing_if = "Option::is_none")]
    pub ws_opts: Option<WsOpts>,

    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WsOpts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
    /// `max-early-data`、`early-data-header-name` 等其余选项
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrojanProxy {
    #[serde(flatten)]
    pub node: ProxyNode,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmessProxy {
    #[serde(flatten)]
    pub node: ProxyNode,
    pub uuid: String,
}

/// 一条代理记录。
///
/// 类型在解析时只根据密钥判断一次：带 `password` 的是 Trojan，带 `uuid` 的是 VMess。
/// 序列化时不带额外的标签，保持原始配置的形状；反序列化走同一套 [`ProxyRecord::classify`]。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProxyRecord {
    Trojan(TrojanProxy),
    Vmess(VmessProxy),
}

/// 节点无法归类时的原因。
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    NotAMapping,
    /// 既没有 `password` 也没有 `uuid`
    NoSecret,
    /// 同时带有 `password` 和 `uuid`，无法判断类型
    Ambiguous,
    Malformed(String),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NotAMapping => write!(f, "entry is not a mapping"),
            Rejection::NoSecret => write!(f, "entry has neither password nor uuid"),
            Rejection::Ambiguous => write!(f, "entry has both password and uuid"),
            Rejection::Malformed(msg) => write!(f, "malformed entry: {}", msg),
        }
    }
}

/// 标量按文本读取：`1001`、`true` 与 `"1001"` 一样可以当作名字或密钥。
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn take_scalar(map: &mut Mapping, key: &str) -> Option<String> {
    let text = scalar_text(map.get(key)?)?;
    map.remove(key);
    Some(text)
}

/// 字段类型符合预期时取出，否则留在映射里。
fn take_typed<T: DeserializeOwned>(map: &mut Mapping, key: &str) -> Option<T> {
    let parsed = serde_yaml::from_value(map.get(key)?.clone()).ok()?;
    map.remove(key);
    Some(parsed)
}

/// 端口既可能写成数字也可能写成字符串。
fn take_port(map: &mut Mapping, key: &str) -> Option<u16> {
    let port = match map.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    map.remove(key);
    Some(port)
}

impl ProxyNode {
    /// 从一个节点映射中取出认识的字段，剩下的全部放进 `extra`。
    pub fn from_mapping(mut map: Mapping) -> Self {
        Self {
            name: take_scalar(&mut map, "name"),
            kind: take_scalar(&mut map, "type"),
            server: take_scalar(&mut map, "server"),
            port: take_port(&mut map, "port"),
            network: take_typed(&mut map, "network"),
            udp: take_typed(&mut map, "udp"),
            sni: take_typed(&mut map, "sni"),
            ws_opts: take_typed(&mut map, "ws-opts"),
            extra: map,
        }
    }

    /// 日志里使用的名字
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

fn take_secret(map: &mut Mapping, key: &str) -> Result<String, Rejection> {
    take_scalar(map, key).ok_or_else(|| Rejection::Malformed(format!("{} is not a scalar", key)))
}

impl ProxyRecord {
    /// 根据密钥把 `proxies` 列表中的一项归类为 Trojan 或 VMess。
    ///
    /// 只有密钥缺失、同时出现或不是标量时才拒绝，其它字段再乱也保留。
    pub fn classify(value: Value) -> Result<Self, Rejection> {
        let Value::Mapping(mut map) = value else {
            return Err(Rejection::NotAMapping);
        };

        match (map.contains_key("password"), map.contains_key("uuid")) {
            (true, true) => Err(Rejection::Ambiguous),
            (false, false) => Err(Rejection::NoSecret),
            (true, false) => {
                let password = take_secret(&mut map, "password")?;
                Ok(ProxyRecord::Trojan(TrojanProxy { node: ProxyNode::from_mapping(map), password }))
            }
            (false, true) => {
                let uuid = take_secret(&mut map, "uuid")?;
                Ok(ProxyRecord::Vmess(VmessProxy { node: ProxyNode::from_mapping(map), uuid }))
            }
        }
    }

    /// 去重使用的密钥：Trojan 的 `password` 或 VMess 的 `uuid`。
    pub fn dedupe_key(&self) -> &str {
        match self {
            ProxyRecord::Trojan(p) => &p.password,
            ProxyRecord::Vmess(p) => &p.uuid,
        }
    }

    pub fn node(&self) -> &ProxyNode {
        match self {
            ProxyRecord::Trojan(p) => &p.node,
            ProxyRecord::Vmess(p) => &p.node,
        }
    }
}

impl<'de> Deserialize<'de> for ProxyRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        ProxyRecord::classify(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_classify_trojan() {
        let value = yaml(
            r#"
name: hk-01
type: trojan
server: hk.example.com
port: 443
password: abc
udp: true
sni: hk.example.com
network: ws
ws-opts:
  path: /ws
  headers:
    Host: hk.example.com
skip-cert-verify: true
"#,
        );
        let record = ProxyRecord::classify(value).unwrap();
        let ProxyRecord::Trojan(trojan) = &record else {
            panic!("expected trojan, got {:?}", record);
        };
        assert_eq!(trojan.password, "abc");
        assert_eq!(trojan.node.name.as_deref(), Some("hk-01"));
        assert_eq!(trojan.node.port, Some(443));
        assert_eq!(trojan.node.udp, Some(true));
        assert_eq!(trojan.node.ws_opts.as_ref().unwrap().path.as_deref(), Some("/ws"));
        assert_eq!(trojan.node.extra.get("skip-cert-verify"), Some(&Value::Bool(true)));
        assert_eq!(trojan.node.extra.len(), 1);
        assert_eq!(record.dedupe_key(), "abc");
    }

    #[test]
    fn test_classify_vmess_with_string_port() {
        let value = yaml(
            r#"
name: sg-02
type: vmess
server: 1.2.3.4
port: "8443"
uuid: 0b1c2d3e-0000-4000-8000-000000000000
alterId: 0
cipher: auto
"#,
        );
        let record = ProxyRecord::classify(value).unwrap();
        assert!(matches!(record, ProxyRecord::Vmess(_)));
        assert_eq!(record.node().port, Some(8443));
        assert_eq!(record.dedupe_key(), "0b1c2d3e-0000-4000-8000-000000000000");
    }

    #[test]
    fn test_classify_rejections() {
        let both = yaml("{name: a, type: trojan, server: s, port: 1, password: p, uuid: u}");
        let neither = yaml("{name: a, type: ss, server: s, port: 1, cipher: aes}");
        let nested_secret = yaml("{name: a, type: trojan, server: s, port: 1, password: [p, q]}");
        let null_secret = yaml("{name: a, type: vmess, server: s, port: 1, uuid: ~}");

        assert_eq!(ProxyRecord::classify(both), Err(Rejection::Ambiguous));
        assert_eq!(ProxyRecord::classify(neither), Err(Rejection::NoSecret));
        assert_eq!(ProxyRecord::classify(yaml("just text")), Err(Rejection::NotAMapping));
        assert!(matches!(ProxyRecord::classify(nested_secret), Err(Rejection::Malformed(_))));
        assert!(matches!(ProxyRecord::classify(null_secret), Err(Rejection::Malformed(_))));
    }

    #[test]
    fn test_numeric_name_and_secret_become_text() {
        let record = ProxyRecord::classify(yaml("{name: 1001, type: trojan, server: s, port: 443, password: 123456}")).unwrap();
        assert_eq!(record.node().name.as_deref(), Some("1001"));
        assert_eq!(record.dedupe_key(), "123456");
    }

    #[test]
    fn test_mistyped_optional_field_is_kept_verbatim() {
        let record = ProxyRecord::classify(yaml("{name: a, type: trojan, server: s, port: 443, password: p, udp: 'true'}")).unwrap();
        assert_eq!(record.node().udp, None);
        assert_eq!(record.node().extra.get("udp"), Some(&Value::from("true")));

        let out: Value = serde_yaml::to_value(&record).unwrap();
        assert_eq!(out.get("udp"), Some(&Value::from("true")));
    }

    #[test]
    fn test_missing_name_and_bad_port_are_tolerated() {
        let record = ProxyRecord::classify(yaml("{type: vmess, server: s, port: http, uuid: u1}")).unwrap();
        assert_eq!(record.node().name, None);
        assert_eq!(record.node().display_name(), "<unnamed>");
        assert_eq!(record.node().port, None);
        assert_eq!(record.node().extra.get("port"), Some(&Value::from("http")));
        assert_eq!(record.dedupe_key(), "u1");
    }

    #[test]
    fn test_serialize_keeps_original_shape() {
        let value = yaml(
            r#"
name: a
type: vmess
server: s
port: 443
uuid: u1
alpn: [h2]
network: ws
ws-opts:
  path: /ray
  max-early-data: 2048
  early-data-header-name: Sec-WebSocket-Protocol
plugin-opts: {~: x}
"#,
        );
        let record = ProxyRecord::classify(value).unwrap();

        let out: Value = serde_yaml::to_value(&record).unwrap();
        let map = out.as_mapping().unwrap();
        assert_eq!(map.get("type"), Some(&Value::from("vmess")));
        assert_eq!(map.get("uuid"), Some(&Value::from("u1")));
        assert!(map.contains_key("alpn"));
        assert!(!map.contains_key("Vmess"));

        let ws = map.get("ws-opts").and_then(Value::as_mapping).unwrap();
        assert_eq!(ws.get("path"), Some(&Value::from("/ray")));
        assert_eq!(ws.get("max-early-data"), Some(&Value::from(2048)));
        assert_eq!(ws.get("early-data-header-name"), Some(&Value::from("Sec-WebSocket-Protocol")));

        // 缓存与结果文件都是 YAML，读回后仍是同一条记录
        let text = serde_yaml::to_string(&record).unwrap();
        let back: ProxyRecord = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, record);
    }
}
