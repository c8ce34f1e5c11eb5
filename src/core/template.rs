use anyhow::Error;
use chrono::format::{Item, StrftimeItems};
use chrono::{Local, Utc};
use handlebars::{
    handlebars_helper, Context, Handlebars, Helper, HelperResult, Output, RenderContext,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};

use crate::models::config::TemplateConfig;

const RANDOM_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// 随机函数
handlebars_helper!(random_int: |min: i64, max: i64| {
    match max >= min {
        true => {
            let mut rng = StdRng::from_entropy();
            rng.gen_range(min..=max)
        }
        false => min,
    }
});

handlebars_helper!(random_string: |length: u64| {
    let mut rng = StdRng::from_entropy();
    (0..length)
        .map(|_| RANDOM_CHARSET[rng.gen_range(0..RANDOM_CHARSET.len())] as char)
        .collect::<String>()
});

// 字符串函数
handlebars_helper!(upper: |s: str| s.to_uppercase());
handlebars_helper!(lower: |s: str| s.to_lowercase());
handlebars_helper!(trim: |s: str| s.trim().to_string());
handlebars_helper!(replace: |s: str, from: str, to: str| s.replace(from, to));
handlebars_helper!(substr: |s: str, start: i64, length: i64| {
    let chars: Vec<char> = s.chars().collect();
    match start >= 0 && (start as usize) < chars.len() && length > 0 {
        true => {
            let start = start as usize;
            let end = (start + length as usize).min(chars.len());
            chars[start..end].iter().collect::<String>()
        }
        false => String::new(),
    }
});

// 数学函数, 除零和模零都返回0
handlebars_helper!(add: |a: i64, b: i64| a + b);
handlebars_helper!(sub: |a: i64, b: i64| a - b);
handlebars_helper!(mul: |a: i64, b: i64| a * b);
handlebars_helper!(div: |a: i64, b: i64| if b == 0 { 0 } else { a / b });
handlebars_helper!(modulo: |a: i64, b: i64| if b == 0 { 0 } else { a % b });

// 时间格式化, 非法格式串原样返回避免渲染中断
handlebars_helper!(date: |format: str| {
    let items: Vec<Item> = StrftimeItems::new(format).collect();
    match items.iter().any(|item| matches!(item, Item::Error)) {
        true => format.to_string(),
        false => Local::now().format_with_items(items.into_iter()).to_string(),
    }
});

// 序列函数
handlebars_helper!(seq: |start: i64, end: i64| {
    match end >= start {
        true => (start..=end).collect::<Vec<i64>>(),
        false => Vec::new(),
    }
});
handlebars_helper!(range: |n: i64| (0..n.max(0)).collect::<Vec<i64>>());

// 条件函数
handlebars_helper!(default_value: |fallback: Json, value: Json| {
    match value {
        Value::Null => fallback.clone(),
        Value::String(s) if s.is_empty() => fallback.clone(),
        other => other.clone(),
    }
});
handlebars_helper!(ternary: |condition: bool, when_true: Json, when_false: Json| {
    match condition {
        true => when_true.clone(),
        false => when_false.clone(),
    }
});

fn random_uuid_helper(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let mut rng = StdRng::from_entropy();
    let b: [u8; 16] = rng.gen();
    let uuid = format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
    );
    out.write(&uuid)?;
    Ok(())
}

fn timestamp_helper(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&Utc::now().timestamp().to_string())?;
    Ok(())
}

fn timestamp_ms_helper(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&Utc::now().timestamp_millis().to_string())?;
    Ok(())
}

fn timestamp_ns_helper(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    out.write(&nanos.to_string())?;
    Ok(())
}

fn now_helper(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&Local::now().to_rfc3339())?;
    Ok(())
}

fn json_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// printf风格的格式化, 依次用参数替换%s/%d/%f/%v, %%转义
fn printf_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let format = h
        .param(0)
        .map(|p| json_to_string(p.value()))
        .unwrap_or_default();
    let mut arg_index = 1;
    let mut result = String::with_capacity(format.len());
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => result.push('%'),
            Some('s') | Some('d') | Some('f') | Some('v') => {
                if let Some(param) = h.param(arg_index) {
                    result.push_str(&json_to_string(param.value()));
                    arg_index += 1;
                }
            }
            Some(other) => {
                result.push('%');
                result.push(other);
            }
            None => result.push('%'),
        }
    }
    out.write(&result)?;
    Ok(())
}

// 模板引擎, 基于handlebars, 内置函数在构建时注册一次
// 渲染是纯函数且线程安全, 随机函数保证跨请求的非确定性
pub struct TemplateEngine {
    enabled: bool,
    variables: Map<String, Value>,
    registry: Handlebars<'static>,
}

impl TemplateEngine {
    pub fn new(config: &TemplateConfig) -> Self {
        let mut registry = Handlebars::new();
        // 渲染目标是URL和请求体, 不做html转义
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_helper("random_int", Box::new(random_int));
        registry.register_helper("random_string", Box::new(random_string));
        registry.register_helper("random_uuid", Box::new(random_uuid_helper));
        registry.register_helper("timestamp", Box::new(timestamp_helper));
        registry.register_helper("timestamp_ms", Box::new(timestamp_ms_helper));
        registry.register_helper("timestamp_ns", Box::new(timestamp_ns_helper));
        registry.register_helper("now", Box::new(now_helper));
        registry.register_helper("date", Box::new(date));
        registry.register_helper("upper", Box::new(upper));
        registry.register_helper("lower", Box::new(lower));
        registry.register_helper("trim", Box::new(trim));
        registry.register_helper("replace", Box::new(replace));
        registry.register_helper("substr", Box::new(substr));
        registry.register_helper("add", Box::new(add));
        registry.register_helper("sub", Box::new(sub));
        registry.register_helper("mul", Box::new(mul));
        registry.register_helper("div", Box::new(div));
        registry.register_helper("mod", Box::new(modulo));
        registry.register_helper("printf", Box::new(printf_helper));
        registry.register_helper("seq", Box::new(seq));
        registry.register_helper("range", Box::new(range));
        registry.register_helper("default", Box::new(default_value));
        registry.register_helper("ternary", Box::new(ternary));

        let variables = config
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        TemplateEngine {
            enabled: config.enabled,
            variables,
            registry,
        }
    }

    // 渲染模板, 配置变量与每次请求注入的变量合并, 后者优先
    pub fn render(&self, template: &str, vars: &Map<String, Value>) -> anyhow::Result<String> {
        if !self.enabled {
            return Ok(template.to_string());
        }
        let mut data = self.variables.clone();
        for (k, v) in vars {
            data.insert(k.clone(), v.clone());
        }
        self.registry
            .render_template(template, &Value::Object(data))
            .map_err(|e| Error::msg(format!("渲染模板失败: {:?}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> TemplateEngine {
        let mut config = TemplateConfig::default();
        config.enabled = true;
        config
            .variables
            .insert("api_key".to_string(), "secret".to_string());
        TemplateEngine::new(&config)
    }

    fn bindings(worker_id: usize) -> Map<String, Value> {
        let mut vars = Map::new();
        vars.insert("worker_id".to_string(), json!(worker_id));
        vars.insert("timestamp".to_string(), json!(1700000000));
        vars
    }

    #[test]
    fn test_disabled_is_identity() {
        let engine = TemplateEngine::new(&TemplateConfig::default());
        let out = engine.render("{{random_int 1 10}}", &Map::new()).unwrap();
        assert_eq!(out, "{{random_int 1 10}}");
    }

    #[test]
    fn test_variable_interpolation() {
        let engine = engine();
        let out = engine
            .render("/w{{worker_id}}?key={{api_key}}&ts={{timestamp}}", &bindings(7))
            .unwrap();
        assert_eq!(out, "/w7?key=secret&ts=1700000000");
    }

    #[test]
    fn test_random_functions_nondeterministic() {
        let engine = engine();
        let first = engine.render("{{random_string 16}}", &Map::new()).unwrap();
        let second = engine.render("{{random_string 16}}", &Map::new()).unwrap();
        assert_eq!(first.len(), 16);
        assert_ne!(first, second);

        let uuid = engine.render("{{random_uuid}}", &Map::new()).unwrap();
        assert_eq!(uuid.len(), 36);
        assert_eq!(uuid.matches('-').count(), 4);
    }

    #[test]
    fn test_random_int_in_range() {
        let engine = engine();
        for _ in 0..20 {
            let out = engine.render("{{random_int 5 9}}", &Map::new()).unwrap();
            let v: i64 = out.parse().unwrap();
            assert!((5..=9).contains(&v));
        }
    }

    #[test]
    fn test_math_functions() {
        let engine = engine();
        assert_eq!(engine.render("{{add 2 3}}", &Map::new()).unwrap(), "5");
        assert_eq!(engine.render("{{sub 2 3}}", &Map::new()).unwrap(), "-1");
        assert_eq!(engine.render("{{mul 4 3}}", &Map::new()).unwrap(), "12");
        assert_eq!(engine.render("{{div 9 2}}", &Map::new()).unwrap(), "4");
        // 除零与模零返回0
        assert_eq!(engine.render("{{div 9 0}}", &Map::new()).unwrap(), "0");
        assert_eq!(engine.render("{{mod 9 0}}", &Map::new()).unwrap(), "0");
        assert_eq!(engine.render("{{mod 9 4}}", &Map::new()).unwrap(), "1");
    }

    #[test]
    fn test_string_functions() {
        let engine = engine();
        assert_eq!(engine.render("{{upper \"abc\"}}", &Map::new()).unwrap(), "ABC");
        assert_eq!(engine.render("{{lower \"ABC\"}}", &Map::new()).unwrap(), "abc");
        assert_eq!(engine.render("{{trim \"  x  \"}}", &Map::new()).unwrap(), "x");
        assert_eq!(
            engine.render("{{replace \"a-b-c\" \"-\" \"_\"}}", &Map::new()).unwrap(),
            "a_b_c"
        );
        assert_eq!(
            engine.render("{{substr \"hello\" 1 3}}", &Map::new()).unwrap(),
            "ell"
        );
        assert_eq!(engine.render("{{substr \"hello\" 9 3}}", &Map::new()).unwrap(), "");
    }

    #[test]
    fn test_loop_over_seq() {
        let engine = engine();
        let out = engine
            .render("{{#each (seq 1 3)}}{{this}};{{/each}}", &Map::new())
            .unwrap();
        assert_eq!(out, "1;2;3;");
        let out = engine
            .render("{{#each (range 3)}}{{this}}{{/each}}", &Map::new())
            .unwrap();
        assert_eq!(out, "012");
    }

    #[test]
    fn test_conditional_functions() {
        let engine = engine();
        assert_eq!(
            engine.render("{{default \"fallback\" \"\"}}", &Map::new()).unwrap(),
            "fallback"
        );
        assert_eq!(
            engine.render("{{default \"fallback\" \"real\"}}", &Map::new()).unwrap(),
            "real"
        );
        assert_eq!(
            engine.render("{{ternary true \"yes\" \"no\"}}", &Map::new()).unwrap(),
            "yes"
        );
        assert_eq!(
            engine.render("{{ternary false \"yes\" \"no\"}}", &Map::new()).unwrap(),
            "no"
        );
    }

    #[test]
    fn test_printf() {
        let engine = engine();
        let out = engine
            .render("{{printf \"id=%d name=%s %v%%\" 42 \"abc\" true}}", &Map::new())
            .unwrap();
        assert_eq!(out, "id=42 name=abc true%");
    }

    #[test]
    fn test_timestamp_functions() {
        let engine = engine();
        let ts: i64 = engine.render("{{timestamp}}", &Map::new()).unwrap().parse().unwrap();
        assert!(ts > 1_600_000_000);
        let ms: i64 = engine
            .render("{{timestamp_ms}}", &Map::new())
            .unwrap()
            .parse()
            .unwrap();
        assert!(ms > ts);
        let now = engine.render("{{now}}", &Map::new()).unwrap();
        assert!(now.contains('T'));
        let date_str = engine.render("{{date \"%Y-%m-%d\"}}", &Map::new()).unwrap();
        assert_eq!(date_str.matches('-').count(), 2);
    }
}
