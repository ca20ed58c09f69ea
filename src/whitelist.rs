//! Archive-name whitelist.
//!
//! Archives whose file name contains any registered pattern (compared
//! case-insensitively) are treated as third-party dependencies and left
//! packed. Every mutation is written back through a [`PatternStore`].
//!
//! Mutations are serialized by their own lock. [`WhitelistFilter::matches`]
//! only clones the current snapshot, so an extraction running alongside an
//! edit may or may not see a pattern added mid-run.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Load/save contract for the persisted pattern list.
pub trait PatternStore: Send + Sync {
    /// Stored patterns, or `None` when nothing has been persisted yet.
    fn load(&self) -> std::io::Result<Option<Vec<String>>>;
    fn save(&self, patterns: &[String]) -> std::io::Result<()>;
}

/// One pattern per line, `#` comments and blank lines ignored.
#[derive(Debug, Clone)]
pub struct FilePatternStore {
    path: PathBuf,
}

const FILE_HEADER: &[&str] = &[
    "# class-harvest archive whitelist",
    "# Archives whose file name contains one of these patterns are left packed.",
    "# One pattern per line, matched case-insensitively as a substring.",
];

impl FilePatternStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PatternStore for FilePatternStore {
    fn load(&self) -> std::io::Result<Option<Vec<String>>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(parse_pattern_lines(&content))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, patterns: &[String]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut out = Vec::new();
        for line in FILE_HEADER {
            writeln!(out, "{line}")?;
        }
        writeln!(out)?;
        for p in patterns {
            writeln!(out, "{p}")?;
        }
        std::fs::write(&self.path, out)
    }
}

/// Keeps patterns in memory only.
#[derive(Debug, Default)]
pub struct MemoryPatternStore {
    saved: Mutex<Option<Vec<String>>>,
}

impl MemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            saved: Mutex::new(Some(patterns.into_iter().map(Into::into).collect())),
        }
    }

    pub fn saved(&self) -> Option<Vec<String>> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PatternStore for MemoryPatternStore {
    fn load(&self) -> std::io::Result<Option<Vec<String>>> {
        Ok(self.saved())
    }

    fn save(&self, patterns: &[String]) -> std::io::Result<()> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(patterns.to_vec());
        Ok(())
    }
}

/// Trims and ignores blank lines and `#` comments.
pub fn parse_pattern_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub struct WhitelistFilter {
    patterns: RwLock<Arc<BTreeSet<String>>>,
    write_lock: Mutex<()>,
    store: Box<dyn PatternStore>,
}

impl std::fmt::Debug for WhitelistFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhitelistFilter")
            .field("patterns", &self.snapshot().len())
            .finish_non_exhaustive()
    }
}

impl WhitelistFilter {
    /// Loads patterns from `store`, seeding it with [`DEFAULT_PATTERNS`] when
    /// it holds nothing yet or cannot be read.
    pub fn open(store: Box<dyn PatternStore>) -> Self {
        let (initial, seed) = match store.load() {
            Ok(Some(lines)) => (normalize_all(lines), false),
            Ok(None) => (default_set(), true),
            Err(err) => {
                tracing::warn!(error = %err, "failed to load whitelist, using defaults");
                (default_set(), false)
            }
        };
        tracing::info!(patterns = initial.len(), "whitelist loaded");

        let filter = Self {
            patterns: RwLock::new(Arc::new(initial)),
            write_lock: Mutex::new(()),
            store,
        };
        if seed {
            filter.persist(&filter.snapshot());
        }
        filter
    }

    /// Starts from `patterns` and keeps changes in memory.
    pub fn in_memory<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::open(Box::new(MemoryPatternStore::with_patterns(patterns)))
    }

    /// True iff any pattern is a substring of `name` (case-insensitive).
    pub fn matches(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.snapshot().iter().any(|p| lower.contains(p.as_str()))
    }

    /// Sorted copy of the current patterns.
    pub fn patterns(&self) -> Vec<String> {
        self.snapshot().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Returns whether the pattern was new.
    pub fn add(&self, pattern: &str) -> bool {
        self.add_all([pattern]) == 1
    }

    /// Returns how many patterns were new.
    pub fn add_all<I, S>(&self, patterns: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let _guard = self.lock_writes();
        let mut next = (*self.snapshot()).clone();
        let added = patterns
            .into_iter()
            .filter_map(|p| normalize(p.as_ref()))
            .filter(|p| next.insert(p.clone()))
            .count();
        if added > 0 {
            tracing::info!(added, "whitelist patterns added");
            self.publish(next);
        }
        added
    }

    /// Returns whether the pattern was present.
    pub fn remove(&self, pattern: &str) -> bool {
        let Some(pattern) = normalize(pattern) else {
            return false;
        };
        let _guard = self.lock_writes();
        let mut next = (*self.snapshot()).clone();
        if !next.remove(&pattern) {
            return false;
        }
        tracing::info!(%pattern, "whitelist pattern removed");
        self.publish(next);
        true
    }

    pub fn clear(&self) {
        let _guard = self.lock_writes();
        tracing::info!("whitelist cleared");
        self.publish(BTreeSet::new());
    }

    pub fn reset_to_default(&self) {
        let _guard = self.lock_writes();
        tracing::info!("whitelist reset to defaults");
        self.publish(default_set());
    }

    fn snapshot(&self) -> Arc<BTreeSet<String>> {
        Arc::clone(&self.patterns.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Callers hold `write_lock`.
    fn publish(&self, next: BTreeSet<String>) {
        let next = Arc::new(next);
        *self.patterns.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&next);
        self.persist(&next);
    }

    fn persist(&self, patterns: &BTreeSet<String>) {
        let list: Vec<String> = patterns.iter().cloned().collect();
        if let Err(err) = self.store.save(&list) {
            tracing::warn!(error = %err, "failed to save whitelist");
        }
    }
}

fn normalize(pattern: &str) -> Option<String> {
    let trimmed = pattern.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

fn normalize_all(patterns: Vec<String>) -> BTreeSet<String> {
    patterns.iter().filter_map(|p| normalize(p)).collect()
}

fn default_set() -> BTreeSet<String> {
    DEFAULT_PATTERNS.iter().filter_map(|p| normalize(p)).collect()
}

/// Common third-party dependency prefixes.
pub const DEFAULT_PATTERNS: &[&str] = &[
    // JDK runtime and bytecode tooling
    "rt-", "tools-", "dt-", "javaws-", "deploy-", "jfxrt-", "jfr-", "jaccess-", "jconsole-",
    "jce-", "jsse-", "sunrsasign-", "localedata-", "dnsns-", "zipfs-", "sunec-",
    "sunjce_provider-", "sunpkcs11-", "sunmscapi-", "charsets-", "cldrdata-", "nashorn-",
    "junit-", "hamcrest-", "asm-", "cglib-", "javassist-",
    // servers and containers
    "tomcat-", "catalina-", "jasper-", "el-api-", "jsp-api-", "servlet-api-", "jetty-",
    "undertow-", "jboss-", "wildfly-", "weblogic-", "websphere-",
    // Spring
    "spring-", "springframework", "spring-boot-", "spring-cloud-", "spring-security-",
    "spring-data-", "spring-session-", "spring-amqp-", "spring-batch-",
    "spring-integration-",
    // ORM
    "mybatis-", "mybatis-plus-", "hibernate-", "hibernate-validator-", "hibernate-search-",
    "eclipselink-", "openjpa-", "querydsl-", "jpa-", "ejb-", "jta-",
    // database drivers
    "mysql-connector-", "mariadb-", "ojdbc", "orai18n-", "xdb-", "xmlparserv2-",
    "postgresql-", "mssql-", "sqljdbc", "h2-", "derby-", "hsqldb-", "sqlite-", "hikaricp-",
    "druid-", "bonecp-", "c3p0-", "proxool-", "dbcp-", "dbcp2-", "dbutils-",
    "jdbctemplate-", "jdbc-", "jdo-", "jpox-",
    // connection pools
    "commons-dbcp", "tomcat-jdbc-",
    // logging
    "slf4j-", "logback-", "log4j-", "log4j2-", "commons-logging-", "jcl-", "jul-",
    "tinylog-", "log4j-api-", "log4j-core-", "log4j-web-", "log4j-slf4j-", "log4j-1.2-api-",
    "log4j-to-slf4j-", "jcl-over-slf4j-", "jul-to-slf4j-",
    // JSON
    "jackson-", "fastjson-", "gson-", "json-lib-", "json-smart-", "jsonpath-",
    "json-simple-", "json-io-", "moshi-", "json-", "jsonp-", "javax.json-", "johnzon-",
    "yasson-", "jsonb-api-", "jsonb-runtime-",
    // serialization
    "protobuf-", "protostuff-", "kryo-", "fst-", "hessian-", "java-serialization-", "avro-",
    "thrift-", "msgpack-", "cbor-", "smile-", "xml-", "yaml-", "xstream-", "jaxb-",
    "jaxb-api-", "jaxb-impl-", "jaxb-runtime-",
    // general utilities
    "commons-", "guava-", "guice-", "caffeine-", "ehcache-", "cache-api-", "javax.cache-",
    "reflections-", "javapoet-", "auto-service-", "auto-value-", "auto-common-", "jodd-",
    "vavr-", "jool-", "streamex-", "cyclops-", "functionaljava-",
    // Apache Commons
    "commons-beanutils", "commons-codec", "commons-collections", "commons-compress",
    "commons-configuration", "commons-digester", "commons-fileupload", "commons-io",
    "commons-jxpath", "commons-lang", "commons-logging", "commons-math", "commons-net",
    "commons-pool", "commons-text", "commons-validator", "commons-vfs", "commons-cli",
    "commons-csv", "commons-email", "commons-exec", "commons-jci", "commons-jexl",
    "commons-modeler", "commons-weaver",
    // testing
    "testng-", "mockito-", "powermock-", "easymock-", "jmock-", "jmockit-", "assertj-",
    "rest-assured-", "wiremock-", "mockserver-", "awaitility-", "fest-assert-", "truth-",
    "spock-", "cucumber-", "jbehave-", "selenium-", "testcontainers-", "jacoco-", "jmeter-",
    "jprofiler-",
    // build tools
    "maven-", "gradle-", "ant-", "ivy-", "nexus-", "artifactory-", "jenkins-", "plexus-",
    "wagon-", "aether-", "maven-plugin-", "maven-core-", "maven-model-",
    // HTTP clients
    "httpclient-", "httpcore-", "httpmime-", "fluent-hc-", "okhttp-", "okio-", "retrofit-",
    "feign-", "ribbon-", "resttemplate-", "webclient-", "async-http-", "unirest-",
    "jersey-client-", "resteasy-client-",
    // networking and RPC
    "netty-", "mina-", "grizzly-", "xnio-", "vertx-", "akka-", "grpc-", "zmq-", "zeromq-",
    "kryonet-",
    // messaging
    "kafka-", "kafka-clients-", "rabbitmq-", "amqp-client-", "rocketmq-", "activemq-",
    "artemis-", "qpid-", "nsq-", "nats-", "pulsar-", "beanstalk-", "mqtt-", "stomp-",
    "amqp-", "jms-", "javax.jms-",
    // caching
    "redis-", "jedis-", "lettuce-", "redisson-", "memcached-", "xmemcached-",
    "spymemcached-", "infinispan-", "hazelcast-", "ignite-", "geode-", "cache2k-",
    // security
    "shiro-", "keycloak-", "oauth-", "openid-", "saml-", "jwt-", "jjwt-",
    "nimbus-jose-jwt-", "pac4j-", "apache-shiro-", "bouncycastle-", "bcprov-", "bcmail-",
    "bcpkix-", "bcpg-", "bcutil-", "tink-", "google-tink-",
    // templates
    "thymeleaf-", "freemarker-", "velocity-", "groovy-", "jsp-", "jstl-", "mustache-",
    "handlebars-", "pebble-", "jte-", "jtwig-", "rythm-",
    // validation
    "javax.validation-", "validation-api-", "oval-", "apache-bval-", "jsr-",
    "bean-validation-",
    // configuration and discovery
    "apollo-", "nacos-", "consul-", "zookeeper-", "etcd-", "archaius-",
    "spring-cloud-config-", "spring-cloud-consul-", "spring-cloud-zookeeper-",
    // scheduling
    "quartz-", "xxl-job-", "elastic-job-", "saturn-", "spring-scheduler-",
    "spring-cloud-task-",
    // search
    "elasticsearch-", "lucene-", "solr-", "sphinx-", "spring-data-elasticsearch-", "jest-",
    "rest-high-level-client-",
    // big data
    "hadoop-", "hbase-", "hive-", "spark-", "flink-", "storm-", "kylin-", "flume-",
    "sqoop-", "oozie-", "azkaban-",
    // microservices
    "dubbo-", "dubbo-spring-boot-", "sofa-", "motan-", "brpc-", "tars-", "servicecomb-",
    "spring-cloud-alibaba-",
    // monitoring and tracing
    "micrometer-", "prometheus-", "zipkin-", "sleuth-", "skywalking-", "pinpoint-", "cat-",
    "jaeger-", "opentracing-", "opencensus-", "javamelody-", "metrics-",
    "dropwizard-metrics-", "influxdb-", "grafana-",
    // deployment
    "docker-", "docker-java-", "kubernetes-", "kubernetes-client-", "fabric8-", "helm-",
    "istio-", "linkerd-",
    // API docs and markup
    "swagger-", "openapi-", "springfox-", "knife4j-", "smart-doc-", "asciidoctor-",
    "asciidoctorj-", "markdown-", "commonmark-", "flexmark-", "pegdown-",
    // web frontend
    "webjars-", "bootstrap-", "jquery-", "vue-", "react-", "angular-", "webpack-",
    // code generation and diagnostics
    "lombok-", "mapstruct-", "immutables-", "auto-", "bytebuddy-", "btrace-", "arthas-",
    "greys-", "jol-", "jmh-",
    // mail
    "javax.mail-", "javax.mail-api-", "javax.activation-", "activation-", "spring-mail-",
    "commons-email-", "simplejavamail-", "greenmail-",
    // office and PDF
    "poi-", "poi-ooxml-", "easypoi-", "alibaba-easyexcel-", "jexcelapi-", "itext-",
    "pdfbox-", "fop-", "barcode4j-", "zxing-", "tess4j-", "im4java-",
    // imaging
    "thumbnailator-", "imgscalr-", "imagej-", "javax.imageio-", "batik-", "jmagick-",
    "metadata-extractor-", "xmpcore-",
    // audio and video
    "ffmpeg-", "jcodec-", "xuggle-", "vlcj-", "jave-", "javacv-", "opencv-",
    // geospatial
    "geotools-", "jts-", "spatial4j-", "geolatte-", "proj4j-", "osmosis-",
    // scientific computing
    "ejml-", "ujmp-", "nd4j-", "deeplearning4j-", "tablesaw-", "tensorflow-", "pytorch-",
    "dl4j-", "weka-", "rapidminer-", "knime-",
    // games
    "libgdx-", "jmonkeyengine-", "slick2d-", "lwjgl-", "jinput-", "jorbis-",
    // blockchain
    "web3j-", "bitcoinj-", "ethereumj-", "hyperledger-", "fabric-", "corda-",
    // machine learning
    "h2o-", "mahout-", "spark-mllib-", "mxnet-", "caffe-",
    // protocols
    "ftp-", "sftp-", "ssh-", "smtp-", "pop3-", "imap-", "ldap-", "kerberos-", "ntlm-",
    "jwe-", "jws-",
    // hardware and IoT
    "pi4j-", "dio-", "jserialcomm-", "rxtx-", "jssc-", "usb4java-", "bluecove-",
    // workflow and reporting
    "activiti-", "camunda-", "flowable-", "jbpm-", "drools-", "ruleengine-", "jreport-",
    "ireport-", "jasperreports-", "birt-", "pentaho-", "spoon-",
    // template engines
    "beetl-", "enjoy-", "jfinal-template-", "stringtemplate-",
    // other web frameworks
    "jfinal-", "nutz-", "solon-", "jboot-", "blade-", "actframework-", "jooby-", "ratpack-",
    "play-", "grails-", "micronaut-", "quarkus-", "helidon-", "javalin-", "sparkjava-",
    "ninja-",
    // additional runtimes and libraries
    "byte-buddy-", "servlet-api", "fastjson", "snakeyaml-", "junit", "httpclient",
    "jersey-", "resteasy-", "validation-api", "curator-", "opentelemetry-", "javax.mail",
    "jakarta.", "easyexcel-", "itext", "fontbox-", "kotlin-stdlib", "kotlinx-",
    "scala-library-", "scala-reflect-",
];
