//! Compile-time lookup tables for the resolution cascade.
//!
//! Everything here is frozen into the binary; no runtime loading. The
//! tables are `pub` so the test suite can assert their contents.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

use crate::types::top_level;

/// Top-level standard-library module names, lowercased. Union of the
/// historical stdlib across interpreter versions; used when the runtime
/// cannot be asked directly.
pub const STDLIB_MODULES: &[&str] = &[
    "abc", "aifc", "antigravity", "argparse", "array", "ast", "asynchat", "asyncio", "asyncore",
    "atexit", "audioop", "base64", "bdb", "binascii", "bisect", "builtins", "bz2", "calendar",
    "cgi", "cgitb", "chunk", "cmath", "cmd", "code", "codecs", "codeop", "collections",
    "colorsys", "compileall", "concurrent", "configparser", "contextlib", "contextvars", "copy",
    "copyreg", "cprofile", "crypt", "csv", "ctypes", "curses", "dataclasses", "datetime", "dbm",
    "decimal", "difflib", "dis", "distutils", "doctest", "email", "encodings", "ensurepip",
    "enum", "errno", "faulthandler", "fcntl", "filecmp", "fileinput", "fnmatch", "formatter",
    "fractions", "ftplib", "functools", "gc", "getopt", "getpass", "gettext", "glob", "graphlib",
    "grp", "gzip", "hashlib", "heapq", "hmac", "html", "http", "idlelib", "imaplib", "imghdr",
    "imp", "importlib", "inspect", "io", "ipaddress", "itertools", "json", "keyword", "lib2to3",
    "linecache", "locale", "logging", "lzma", "mailbox", "mailcap", "marshal", "math",
    "mimetypes", "mmap", "modulefinder", "msilib", "msvcrt", "multiprocessing", "netrc", "nis",
    "nntplib", "ntpath", "numbers", "operator", "optparse", "os", "ossaudiodev", "pathlib",
    "pdb", "pickle", "pickletools", "pipes", "pkgutil", "platform", "plistlib", "poplib",
    "posix", "posixpath", "pprint", "profile", "pstats", "pty", "pwd", "py_compile", "pyclbr",
    "pydoc", "queue", "quopri", "random", "re", "readline", "reprlib", "resource", "rlcompleter",
    "runpy", "sched", "secrets", "select", "selectors", "shelve", "shlex", "shutil", "signal",
    "site", "smtplib", "sndhdr", "socket", "socketserver", "spwd", "sqlite3", "ssl", "stat",
    "statistics", "string", "stringprep", "struct", "subprocess", "sunau", "symbol", "symtable",
    "sys", "sysconfig", "syslog", "tabnanny", "tarfile", "telnetlib", "tempfile", "termios",
    "test", "textwrap", "threading", "time", "timeit", "tkinter", "token", "tokenize", "tomllib",
    "trace", "traceback", "tracemalloc", "tty", "turtle", "turtledemo", "types", "typing",
    "unicodedata", "unittest", "urllib", "uu", "uuid", "venv", "warnings", "wave", "weakref",
    "webbrowser", "winreg", "winsound", "wsgiref", "xdrlib", "xml", "xmlrpc", "zipapp",
    "zipfile", "zipimport", "zlib", "zoneinfo",
];

static STDLIB_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| STDLIB_MODULES.iter().copied().collect());

/// Stdlib filter. Underscore-prefixed modules are interpreter internals
/// and count as stdlib too.
pub fn is_stdlib(module: &str) -> bool {
    if module.starts_with('_') {
        return true;
    }
    let base = top_level(module).to_lowercase();
    STDLIB_SET.contains(base.as_str())
}

/// Import name -> canonical distribution name, for the cases where the
/// two differ. Values may carry an extras suffix.
pub const COMMON_MAPPINGS: &[(&str, &str)] = &[
    ("Bio", "biopython"),
    ("Crypto", "pycryptodome"),
    ("Cryptodome", "pycryptodome"),
    ("Levenshtein", "python-Levenshtein"),
    ("MySQLdb", "mysqlclient"),
    ("OpenSSL", "pyOpenSSL"),
    ("PIL", "Pillow"),
    ("Xlib", "python-xlib"),
    ("attr", "attrs"),
    ("barcode", "python-barcode"),
    ("bs4", "beautifulsoup4"),
    ("bson", "pymongo"),
    ("cairo", "pycairo"),
    ("cassandra", "cassandra-driver"),
    ("corsheaders", "django-cors-headers"),
    ("cv2", "opencv-python"),
    ("dateutil", "python-dateutil"),
    ("decouple", "python-decouple"),
    ("dns", "dnspython"),
    ("docx", "python-docx"),
    ("dotenv", "python-dotenv"),
    ("engineio", "python-engineio"),
    ("environ", "django-environ"),
    ("fitz", "PyMuPDF"),
    ("flask_cors", "Flask-Cors"),
    ("flask_login", "Flask-Login"),
    ("flask_migrate", "Flask-Migrate"),
    ("flask_sqlalchemy", "Flask-SQLAlchemy"),
    ("flask_wtf", "Flask-WTF"),
    ("gi", "PyGObject"),
    ("git", "GitPython"),
    ("github", "PyGithub"),
    ("googleapiclient", "google-api-python-client"),
    ("jose", "python-jose[cryptography]"),
    ("jwt", "PyJWT"),
    ("kafka", "kafka-python"),
    ("ldap", "python-ldap"),
    ("magic", "python-magic"),
    ("memcache", "python-memcached"),
    ("multipart", "python-multipart"),
    ("mysql", "pymysql"),
    ("nacl", "PyNaCl"),
    ("pkg_resources", "setuptools"),
    ("pptx", "python-pptx"),
    ("psycopg2", "psycopg2-binary"),
    ("pydantic_settings", "pydantic-settings"),
    ("qrcode", "qrcode[pil]"),
    ("rest_framework", "djangorestframework"),
    ("rtree", "Rtree"),
    ("ruamel", "ruamel.yaml"),
    ("serial", "pyserial"),
    ("skimage", "scikit-image"),
    ("sklearn", "scikit-learn"),
    ("slugify", "python-slugify"),
    ("snappy", "python-snappy"),
    ("socketio", "python-socketio"),
    ("socks", "PySocks"),
    ("speech_recognition", "SpeechRecognition"),
    ("telegram", "python-telegram-bot"),
    ("tls_client", "tls-client"),
    ("usb", "pyusb"),
    ("websocket", "websocket-client"),
    ("win32api", "pywin32"),
    ("win32com", "pywin32"),
    ("wx", "wxPython"),
    ("yaml", "PyYAML"),
    ("zmq", "pyzmq"),
];

static MAPPING_EXACT: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| COMMON_MAPPINGS.iter().copied().collect());

static MAPPING_LOWER: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    COMMON_MAPPINGS
        .iter()
        .map(|(k, v)| (k.to_lowercase(), *v))
        .collect()
});

/// Mapping-table lookup: exact casing first, then case-insensitive.
pub fn lookup_mapping(module: &str) -> Option<&'static str> {
    MAPPING_EXACT
        .get(module)
        .or_else(|| MAPPING_LOWER.get(&module.to_lowercase()))
        .copied()
}

/// Generic names overwhelmingly used for local code. Applied only after
/// the local-module filter, as a fallback heuristic.
pub const SUSPICIOUS_NAMES: &[&str] = &[
    "admin", "amazon", "api", "app", "aws", "azure", "base", "common", "config",
    "context_processors", "controllers", "core", "crm", "database", "db", "extensions",
    "fixtures", "forms", "google", "helpers", "infra", "jobs", "ledgers", "lib", "libs",
    "main", "manage", "management", "middleware", "migrations", "models", "modules", "plugins",
    "routers", "run", "schemas", "serializers", "server", "services", "settings", "setup",
    "signals", "start", "tasks", "templatetags", "test", "tests", "utils", "views", "worker",
];

static SUSPICIOUS_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| SUSPICIOUS_NAMES.iter().copied().collect());

pub fn is_suspicious(module: &str) -> bool {
    SUSPICIOUS_SET.contains(module.to_lowercase().as_str())
}

/// Popular distributions whose import name equals their (normalized)
/// distribution name. Lets common projects resolve entirely offline.
pub const BUNDLED_INDEX: &[&str] = &[
    // Data science / ML
    "numpy", "pandas", "scipy", "matplotlib", "seaborn", "scikit-learn", "tensorflow", "torch",
    "keras", "plotly", "bokeh", "altair", "streamlit", "jupyter", "notebook", "ipython",
    "statsmodels", "sympy", "networkx", "transformers", "tokenizers", "datasets",
    "sentencepiece", "nltk", "spacy", "gensim", "xgboost", "lightgbm", "catboost", "optuna",
    "mlflow", "wandb", "duckdb", "polars", "pyarrow", "dask", "numba", "cython", "openai",
    "anthropic", "langchain", "chromadb",
    // Web frameworks
    "django", "flask", "fastapi", "starlette", "sanic", "tornado", "aiohttp", "pyramid",
    "bottle", "cherrypy", "falcon", "quart", "litestar", "jinja2", "markupsafe", "itsdangerous",
    "werkzeug", "blinker",
    // Validation / serialization
    "pydantic", "marshmallow", "cerberus", "jsonschema", "msgspec", "orjson", "ujson",
    "protobuf", "grpcio", "thrift", "avro",
    // Database / ORM
    "sqlalchemy", "tortoise-orm", "peewee", "pony", "sqlmodel", "piccolo", "alembic",
    "psycopg2", "psycopg2-binary", "asyncpg", "pymysql", "mysqlclient", "aiomysql", "redis",
    "aioredis", "pymongo", "motor", "cassandra-driver", "elasticsearch", "influxdb",
    "clickhouse-driver", "aiosqlite", "minio", "supabase",
    // Networking / HTTP
    "requests", "httpx", "urllib3", "grequests", "uplink", "httpcore", "websockets",
    "paramiko", "pika", "kombu", "confluent-kafka",
    // CLI / terminal
    "click", "typer", "rich", "tqdm", "colorama", "fire", "docopt", "python-dotenv",
    "dynaconf", "loguru", "structlog", "tabulate", "termcolor", "questionary",
    "prompt-toolkit", "pexpect",
    // Testing
    "pytest", "nose2", "tox", "nox", "coverage", "hypothesis", "faker", "factory-boy",
    "pytest-cov", "pytest-asyncio", "pytest-mock", "pytest-xdist", "selenium",
    // Lint / format
    "black", "ruff", "isort", "mypy", "flake8", "pylint", "autopep8", "yapf", "pre-commit",
    "bandit",
    // Async
    "trio", "curio", "anyio", "greenlet", "gevent", "uvloop", "aiofiles",
    // Security / auth
    "passlib", "bcrypt", "argon2-cffi", "pyjwt", "python-jose", "authlib", "oauthlib",
    "cryptography", "pyopenssl",
    // Cloud
    "boto3", "botocore", "s3fs", "gcsfs", "azure-storage-blob", "google-cloud-storage",
    "stripe", "twilio", "sendgrid", "slack-sdk",
    // Imaging / media
    "pillow", "opencv-python", "scikit-image", "moviepy", "imageio",
    // Documents / spreadsheets
    "reportlab", "pdfminer", "pypdf2", "pdfplumber", "weasyprint", "openpyxl", "xlrd",
    "xlsxwriter", "pandas-profiling", "markdown", "bleach",
    // DevOps
    "docker", "kubernetes", "ansible", "fabric", "invoke", "pulumi", "psutil", "distro",
    "watchdog",
    // Task queues / scheduling
    "celery", "dramatiq", "rq", "huey", "schedule", "apscheduler", "croniter",
    // Parsing / scraping
    "pyyaml", "toml", "tomli", "xmltodict", "beautifulsoup4", "lxml", "parsel", "scrapy",
    // Dates / text / misc
    "phonenumbers", "pycountry", "pytz", "pendulum", "arrow", "dateparser", "humanize",
    "python-dateutil", "python-slugify", "packaging", "tenacity", "backoff", "cachetools",
    "diskcache", "filelock", "platformdirs", "appdirs", "typing-extensions", "mock",
    "pathlib2", "setuptools", "wheel", "twine",
    // Server companions
    "email-validator", "python-multipart", "gunicorn", "uvicorn", "hypercorn", "daphne",
    "python-barcode", "qrcode",
];

static BUNDLED_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| BUNDLED_INDEX.iter().copied().collect());

/// Bundled-index membership for a lowercased, hyphen-normalized name.
pub fn in_bundled_index(normalized: &str) -> bool {
    BUNDLED_SET.contains(normalized)
}

/// Distributions that imply a companion the project will need at run
/// time. Companions are emitted as peer dependencies.
pub const FRAMEWORK_EXTRAS: &[(&str, &[&str])] = &[
    ("celery", &["redis"]),
    ("django", &["gunicorn"]),
    ("fastapi", &["uvicorn"]),
    ("flask", &["gunicorn"]),
    ("pandas", &["openpyxl"]),
    ("sqlalchemy", &["psycopg2-binary"]),
];

/// DSN scheme -> default driver module, used when the connection string
/// names no explicit `+driver`. `None` means the driver ships with the
/// standard library and implies nothing.
pub const DSN_DEFAULT_DRIVERS: &[(&str, Option<&str>)] = &[
    ("mongodb", Some("pymongo")),
    ("mssql", Some("pyodbc")),
    ("mysql", Some("pymysql")),
    ("oracle", Some("oracledb")),
    ("postgres", Some("psycopg2")),
    ("postgresql", Some("psycopg2")),
    ("redis", Some("redis")),
    ("sqlite", None),
];

pub fn dsn_default_driver(scheme: &str) -> Option<&'static str> {
    DSN_DEFAULT_DRIVERS
        .iter()
        .find(|(s, _)| *s == scheme)
        .and_then(|(_, driver)| *driver)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdlib_set_is_comprehensive() {
        assert!(STDLIB_MODULES.len() >= 150);
        for name in ["os", "sys", "json", "math", "typing", "asyncio"] {
            assert!(is_stdlib(name), "{name} should be stdlib");
        }
        assert!(is_stdlib("os.path"));
        assert!(is_stdlib("_internal"));
        for name in ["requests", "numpy", "black", "pyinfer"] {
            assert!(!is_stdlib(name), "{name} should not be stdlib");
        }
    }

    #[test]
    fn mapping_table_size_and_contents() {
        assert!(COMMON_MAPPINGS.len() >= 60);
        assert_eq!(lookup_mapping("cv2"), Some("opencv-python"));
        assert_eq!(lookup_mapping("PIL"), Some("Pillow"));
        assert_eq!(lookup_mapping("pil"), Some("Pillow"));
        assert_eq!(lookup_mapping("yaml"), Some("PyYAML"));
        assert_eq!(lookup_mapping("requests"), None);
    }

    #[test]
    fn bundled_index_size_and_normalization() {
        assert!(BUNDLED_INDEX.len() >= 200);
        for name in BUNDLED_INDEX {
            assert_eq!(
                *name,
                name.trim().to_lowercase().replace('_', "-"),
                "bundled entry {name} must be pre-normalized"
            );
        }
        assert!(in_bundled_index("ujson"));
        assert!(in_bundled_index("requests"));
        assert!(!in_bundled_index("definitely-not-a-package"));
    }

    #[test]
    fn suspicious_names_cover_generic_layouts() {
        assert!(SUSPICIOUS_NAMES.len() >= 40);
        assert!(is_suspicious("utils"));
        assert!(is_suspicious("Models"));
        assert!(!is_suspicious("requests"));
    }

    #[test]
    fn framework_extras_entries() {
        let table: std::collections::HashMap<_, _> = FRAMEWORK_EXTRAS.iter().copied().collect();
        assert_eq!(table["fastapi"], &["uvicorn"]);
        assert_eq!(table["celery"], &["redis"]);
        assert_eq!(table["sqlalchemy"], &["psycopg2-binary"]);
    }

    #[test]
    fn dsn_driver_defaults() {
        assert_eq!(dsn_default_driver("postgresql"), Some("psycopg2"));
        assert_eq!(dsn_default_driver("mysql"), Some("pymysql"));
        assert_eq!(dsn_default_driver("sqlite"), None);
        assert_eq!(dsn_default_driver("nosuchscheme"), None);
    }
}
