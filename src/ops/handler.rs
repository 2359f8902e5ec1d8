//! Generated source files.
//!
//! Two files are produced per run: one handler file beside every entry
//! point, which serves that instance's counters over HTTP and registers the
//! instance with the center, and one global file holding every counter
//! declaration so all instrumented packages link against a single set of
//! symbols.

use std::fmt::Write as _;

use crate::core::cover_var::PackageCover;
use crate::util::config::CoverMode;

/// File written beside each entry point.
pub const HANDLER_FILE_NAME: &str = "http_cover_apis_auto_generated.go";

/// File written in the global counter package.
pub const GLOBAL_FILE_NAME: &str = "cover.go";

const GENERATED_HEADER: &str = "// Code generated by coverscope. DO NOT EDIT.\n";

/// Inputs of one entry point's handler file.
#[derive(Debug, Clone, Copy)]
pub struct HandlerSpec<'a> {
    /// Declared package name of the entry point.
    pub package_name: &'a str,
    /// Counter semantics.
    pub mode: CoverMode,
    /// Registry URL.
    pub center: &'a str,
    /// Skip registration.
    pub singleton: bool,
    /// Fixed listen address, empty for a random port.
    pub agent_port: &'a str,
    /// Import path of the global counter package.
    pub global_import_path: &'a str,
}

const HANDLER_TEMPLATE: &str = r#"
package {{PACKAGE}}

import (
	"bytes"
	"fmt"
	"log"
	"net"
	"net/http"
	"net/url"
	"os"
	"path/filepath"
	"sync/atomic"

	_cover {{GLOBAL_IMPORT}}
)

type coverscopeBlock struct {
	file    string
	count   []uint32
	pos     []uint32
	numStmt []uint16
}

var coverscopeBlocks = []coverscopeBlock{
{{COUNTERS}}}

const (
	coverscopeMode      = {{MODE}}
	coverscopeCenter    = {{CENTER}}
	coverscopeAgentPort = {{AGENT_PORT}}
	coverscopeSingleton = {{SINGLETON}}
)

func init() {
	listenAddr := coverscopeAgentPort
	if listenAddr == "" {
		listenAddr = "127.0.0.1:0"
	}
	ln, err := net.Listen("tcp", listenAddr)
	if err != nil {
		log.Fatalf("[coverscope] failed to listen on %s: %v", listenAddr, err)
	}

	mux := http.NewServeMux()
	mux.HandleFunc("/v1/cover/profile", coverscopeProfile)
	mux.HandleFunc("/v1/cover/clear", coverscopeClear)
	go func() {
		if err := http.Serve(ln, mux); err != nil {
			log.Printf("[coverscope] coverage endpoint stopped: %v", err)
		}
	}()

	if !coverscopeSingleton {
		if err := coverscopeRegister(ln.Addr().(*net.TCPAddr)); err != nil {
			log.Printf("[coverscope] register with %s failed: %v", coverscopeCenter, err)
		}
	}
}

func coverscopeRegister(addr *net.TCPAddr) error {
	host, ipRevise := addr.IP.String(), "false"
	if addr.IP.IsUnspecified() {
		host, ipRevise = "127.0.0.1", "true"
	}
	q := url.Values{}
	q.Set("name", filepath.Base(os.Args[0]))
	q.Set("address", fmt.Sprintf("http://%s", net.JoinHostPort(host, fmt.Sprint(addr.Port))))
	q.Set("ip_revise", ipRevise)
	resp, err := http.Post(coverscopeCenter+"/v1/cover/register?"+q.Encode(), "", nil)
	if err != nil {
		return err
	}
	defer resp.Body.Close()
	if resp.StatusCode != http.StatusOK {
		return fmt.Errorf("unexpected status %s", resp.Status)
	}
	return nil
}

func coverscopeProfile(w http.ResponseWriter, r *http.Request) {
	var buf bytes.Buffer
	fmt.Fprintf(&buf, "mode: %s\n", coverscopeMode)
	for _, block := range coverscopeBlocks {
		for i := range block.count {
			fmt.Fprintf(&buf, "%s:%d.%d,%d.%d %d %d\n", block.file,
				block.pos[3*i+0], uint16(block.pos[3*i+2]),
				block.pos[3*i+1], uint16(block.pos[3*i+2]>>16),
				block.numStmt[i],
				atomic.LoadUint32(&block.count[i]))
		}
	}
	w.Header().Set("Content-Type", "text/plain; charset=utf-8")
	_, _ = w.Write(buf.Bytes())
}

func coverscopeClear(w http.ResponseWriter, r *http.Request) {
	for _, block := range coverscopeBlocks {
		for i := range block.count {
			atomic.StoreUint32(&block.count[i], 0)
		}
	}
	fmt.Fprintln(w, "clear profile success")
}
"#;

/// Render the handler file for one entry point and the packages it links.
pub fn render_handler<'a>(
    spec: &HandlerSpec<'_>,
    packages: impl IntoIterator<Item = &'a PackageCover>,
) -> String {
    let mut counters = String::new();
    for cover in packages {
        for var in cover.vars.values() {
            let _ = writeln!(
                counters,
                "\t{{file: {}, count: _cover.{v}.Count[:], pos: _cover.{v}.Pos[:], numStmt: _cover.{v}.NumStmt[:]}},",
                go_quote(&var.file),
                v = var.var,
            );
        }
    }

    let body = HANDLER_TEMPLATE
        .replace("{{PACKAGE}}", spec.package_name)
        .replace("{{GLOBAL_IMPORT}}", &go_quote(spec.global_import_path))
        .replace("{{COUNTERS}}", &counters)
        .replace("{{MODE}}", &go_quote(spec.mode.as_str()))
        .replace("{{CENTER}}", &go_quote(spec.center.trim_end_matches('/')))
        .replace("{{AGENT_PORT}}", &go_quote(spec.agent_port))
        .replace("{{SINGLETON}}", if spec.singleton { "true" } else { "false" });

    format!("{}{}", GENERATED_HEADER, body)
}

/// Render the global declaration file.
pub fn render_global(package_name: &str, declarations: &str) -> String {
    format!(
        "{}\npackage {}\n{}",
        GENERATED_HEADER, package_name, declarations
    )
}

/// Quote `s` as a Go interpreted string literal.
pub fn go_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cover_var::CoverVar;
    use std::collections::BTreeMap;

    fn cover(import_path: &str, files: &[(&str, &str)]) -> PackageCover {
        let vars: BTreeMap<_, _> = files
            .iter()
            .map(|(file, var)| {
                (
                    file.to_string(),
                    CoverVar {
                        file: format!("{}/{}", import_path, file),
                        var: var.to_string(),
                    },
                )
            })
            .collect();
        PackageCover {
            import_path: import_path.to_string(),
            vars,
        }
    }

    #[test]
    fn test_render_handler() {
        let main = cover("example.com/app", &[("main.go", "GoCover_0_aaaaaaaaaaaa")]);
        let dep = cover("example.com/app/db", &[("db.go", "GoCover_0_bbbbbbbbbbbb")]);
        let spec = HandlerSpec {
            package_name: "main",
            mode: CoverMode::Atomic,
            center: "http://127.0.0.1:7777/",
            singleton: false,
            agent_port: ":8100",
            global_import_path: "example.com/app/src/coverscopebuild0123",
        };

        let text = render_handler(&spec, [&main, &dep]);

        assert!(text.starts_with(GENERATED_HEADER));
        assert!(text.contains("\npackage main\n"));
        assert!(text.contains("_cover \"example.com/app/src/coverscopebuild0123\""));
        assert!(text.contains(
            "{file: \"example.com/app/main.go\", count: _cover.GoCover_0_aaaaaaaaaaaa.Count[:]"
        ));
        assert!(text.contains("_cover.GoCover_0_bbbbbbbbbbbb.NumStmt[:]"));
        assert!(text.contains("coverscopeMode      = \"atomic\""));
        assert!(text.contains("coverscopeCenter    = \"http://127.0.0.1:7777\""));
        assert!(text.contains("coverscopeAgentPort = \":8100\""));
        assert!(text.contains("coverscopeSingleton = false"));
        assert!(!text.contains("{{"));
    }

    #[test]
    fn test_render_global() {
        let text = render_global("coverscopebuild0123", "\nvar GoCover_0_x = 1\n");
        assert_eq!(
            text,
            "// Code generated by coverscope. DO NOT EDIT.\n\npackage coverscopebuild0123\n\nvar GoCover_0_x = 1\n"
        );
    }

    #[test]
    fn test_go_quote() {
        assert_eq!(go_quote("a\"b\\c"), "\"a\\\"b\\\\c\"");
        assert_eq!(go_quote("tab\there"), "\"tab\\there\"");
        assert_eq!(go_quote("\u{1}"), "\"\\x01\"");
    }
}
